use super::MailProvider;

#[derive(Debug, Clone, Copy)]
pub struct ProviderContract {
    pub provider: MailProvider,
    pub id: &'static str,
    pub name: &'static str,
}

impl ProviderContract {
    pub fn init_url(&self, prefix: &str) -> String {
        format!("{}/{}-oauth-init", trim_prefix(prefix), self.id)
    }

    pub fn exchange_url(&self, prefix: &str) -> String {
        format!("{}/{}-token-exchange", trim_prefix(prefix), self.id)
    }

    pub fn success_tag(&self) -> String {
        format!("{}-oauth-success", self.id)
    }

    pub fn error_tag(&self) -> String {
        format!("{}-oauth-error", self.id)
    }
}

pub fn trim_prefix(prefix: &str) -> &str {
    prefix.trim().trim_end_matches('/')
}
