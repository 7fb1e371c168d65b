use super::contract::ProviderContract;
use super::MailProvider;

const PROVIDERS: [ProviderContract; 2] = [
    ProviderContract {
        provider: MailProvider::Gmail,
        id: "gmail",
        name: "Gmail",
    },
    ProviderContract {
        provider: MailProvider::Outlook,
        id: "outlook",
        name: "Outlook",
    },
];

pub fn find_provider_contract(provider_id: &str) -> Option<&'static ProviderContract> {
    let provider_id = provider_id.trim().to_ascii_lowercase();
    PROVIDERS.iter().find(|provider| provider.id == provider_id)
}

pub(super) fn contract_for(provider: MailProvider) -> &'static ProviderContract {
    match provider {
        MailProvider::Gmail => &PROVIDERS[0],
        MailProvider::Outlook => &PROVIDERS[1],
    }
}
