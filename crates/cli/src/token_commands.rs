use std::time::Duration;

use {
    agentgate_auth::{Claims, TokenSigner},
    agentgate_config::GatewayConfig,
    anyhow::{Context, Result},
    clap::Subcommand,
};

#[derive(Subcommand)]
pub enum TokenAction {
    /// Mint a bearer credential for an account.
    Issue {
        /// Account id written to the `user_id` claim.
        #[arg(long)]
        user_id: i64,
        /// Lifetime in seconds. Defaults to `auth.token_ttl_secs`.
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
    /// Check a credential's signature and expiry and print its claims.
    Verify { token: String },
}

pub fn handle_token(action: TokenAction, config: &GatewayConfig) -> Result<()> {
    match action {
        TokenAction::Issue { user_id, ttl_secs } => {
            println!("{}", issue(config, user_id, ttl_secs)?);
        },
        TokenAction::Verify { token } => {
            let claims = verify(config, &token)?;
            println!("{}", serde_json::to_string_pretty(&claims)?);
        },
    }
    Ok(())
}

fn signer(config: &GatewayConfig, ttl_secs: u64) -> Result<TokenSigner> {
    let secret = config
        .auth
        .jwt_secret
        .as_ref()
        .context("auth.jwt_secret is not set (config file or AGENTGATE_JWT_SECRET)")?;
    Ok(TokenSigner::new(secret, Duration::from_secs(ttl_secs)))
}

fn issue(config: &GatewayConfig, user_id: i64, ttl_secs: Option<u64>) -> Result<String> {
    let ttl = ttl_secs.unwrap_or(config.auth.token_ttl_secs);
    Ok(signer(config, ttl)?.issue(user_id)?)
}

fn verify(config: &GatewayConfig, token: &str) -> Result<Claims> {
    let claims = signer(config, config.auth.token_ttl_secs)?
        .verify(token)
        .context("token rejected")?;
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use {super::*, secrecy::Secret};

    fn config_with_secret(secret: &str) -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.auth.jwt_secret = Some(Secret::new(secret.into()));
        config
    }

    #[test]
    fn issued_token_verifies_with_same_secret() {
        let config = config_with_secret("s3cret");
        let token = issue(&config, 12, Some(60)).unwrap();
        let claims = verify(&config, &token).unwrap();
        assert_eq!(claims.user_id, 12);
        assert_eq!(claims.exp - claims.iat, 60);
    }

    #[test]
    fn default_ttl_comes_from_config() {
        let mut config = config_with_secret("s3cret");
        config.auth.token_ttl_secs = 90;
        let claims = verify(&config, &issue(&config, 1, None).unwrap()).unwrap();
        assert_eq!(claims.exp - claims.iat, 90);
    }

    #[test]
    fn other_secret_rejects() {
        let token = issue(&config_with_secret("a"), 1, None).unwrap();
        assert!(verify(&config_with_secret("b"), &token).is_err());
    }

    #[test]
    fn missing_secret_is_an_error() {
        let err = issue(&GatewayConfig::default(), 1, None).unwrap_err();
        assert!(err.to_string().contains("jwt_secret"));
    }

    #[test]
    fn secret_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agentgate.toml");
        std::fs::write(&path, "[auth]\njwt_secret = \"from-file\"\ntoken_ttl_secs = 30\n").unwrap();
        let config = agentgate_config::load_config(&path).unwrap();

        let token = issue(&config, 4, None).unwrap();
        let claims = verify(&config_with_secret("from-file"), &token).unwrap();
        assert_eq!(claims.user_id, 4);
        assert_eq!(claims.exp - claims.iat, 30);
    }
}
