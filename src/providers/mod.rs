mod contract;
mod registry;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};

pub use contract::{trim_prefix, ProviderContract};
pub use registry::find_provider_contract;

/// Mail providers an account can be linked with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailProvider {
    Gmail,
    Outlook,
}

impl MailProvider {
    pub fn parse(value: &str) -> Result<Self> {
        find_provider_contract(value)
            .map(|contract| contract.provider)
            .ok_or_else(|| LinkError::UnknownProvider(value.trim().to_string()))
    }

    pub fn contract(self) -> &'static ProviderContract {
        registry::contract_for(self)
    }

    pub fn id(self) -> &'static str {
        self.contract().id
    }

    pub fn name(self) -> &'static str {
        self.contract().name
    }
}

impl fmt::Display for MailProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_provider_is_resolved() {
        let provider = find_provider_contract("gmail").expect("provider should exist");
        assert_eq!(provider.id, "gmail");
        assert!(find_provider_contract(" OUTLOOK ").is_some());
        assert!(find_provider_contract("yahoo").is_none());
        assert_eq!(MailProvider::parse(" Gmail").expect("parse"), MailProvider::Gmail);
        assert!(matches!(
            MailProvider::parse("yahoo"),
            Err(LinkError::UnknownProvider(id)) if id == "yahoo"
        ));
    }

    #[test]
    fn every_provider_maps_to_its_own_contract() {
        for provider in [MailProvider::Gmail, MailProvider::Outlook] {
            assert_eq!(provider.contract().provider, provider);
            assert_eq!(MailProvider::parse(provider.id()).expect("round trip"), provider);
        }
        assert_eq!(MailProvider::Outlook.name(), "Outlook");
    }

    #[test]
    fn endpoint_urls_and_tags_follow_provider_id() {
        let contract = MailProvider::Outlook.contract();
        assert_eq!(
            contract.init_url("https://api.example.com/functions/v1/email/"),
            "https://api.example.com/functions/v1/email/outlook-oauth-init"
        );
        assert_eq!(
            contract.exchange_url("https://api.example.com/fn"),
            "https://api.example.com/fn/outlook-token-exchange"
        );
        assert_eq!(contract.success_tag(), "outlook-oauth-success");
        assert_eq!(contract.error_tag(), "outlook-oauth-error");
        assert_eq!(MailProvider::Gmail.to_string(), "gmail");
    }
}
