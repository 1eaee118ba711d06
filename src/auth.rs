use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::PgWireResult;

/// One shared cleartext password for every campaign. The login user only
/// names the campaign; it does not pick the password.
#[derive(Debug)]
pub struct AirtimeAuthSource {
    password: String,
}

impl AirtimeAuthSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthSource for AirtimeAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        tracing::debug!("password check for campaign {:?}", login.user());
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}
