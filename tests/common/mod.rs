#![allow(dead_code, clippy::unwrap_used)]

use idp::challenge::{
    ChallengeArtifact, ChallengeConfig, ChallengeEngine, ChallengeKeys, IssuedChallenge,
    ManualClock, NewIdentity,
};
use idp::credentials::{ClaimSigner, ClaimVerifier, HashingCost, SymmetricKey, UrlSigningKey};
use idp::identity::{Identity, IdentityStore, MemoryIdentityStore};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use url::Url;

pub const T0: i64 = 1_700_000_000;
pub const PASSWORD: &str = "correct horse battery staple";

fn pem(name: &str) -> String {
    std::fs::read_to_string(format!(
        "{}/tests/fixtures/{name}",
        env!("CARGO_MANIFEST_DIR")
    ))
    .unwrap()
}

/// Keys from the `recover_*` fixtures, or the `foreign_*` ones.
pub fn keys(foreign: bool) -> ChallengeKeys {
    let prefix = if foreign { "foreign" } else { "recover" };
    ChallengeKeys {
        claim_signer: ClaimSigner::from_pem(&pem(&format!("{prefix}_signing_key.pem"))).unwrap(),
        claim_verifier: ClaimVerifier::from_pem(&pem(&format!("{prefix}_verify_key.pem")))
            .unwrap(),
        url_key: UrlSigningKey::new(format!("{prefix}-url-key").into_bytes()).unwrap(),
        completion_key: SymmetricKey::from_bytes(&[3u8; 32]).unwrap(),
        totp_key: SymmetricKey::from_bytes(&[4u8; 32]).unwrap(),
    }
}

pub fn config(keys: ChallengeKeys) -> ChallengeConfig {
    let base = Url::parse("https://id.example.com/").unwrap();
    ChallengeConfig::new("https://id.example.com", "idp", &base, keys)
        .with_hashing_cost(HashingCost::new(1024, 1, 1))
}

pub struct Harness {
    pub engine: ChallengeEngine,
    pub store: Arc<MemoryIdentityStore>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(config: ChallengeConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryIdentityStore::new()))
    }

    pub fn with_store(config: ChallengeConfig, store: Arc<MemoryIdentityStore>) -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let engine = ChallengeEngine::new(Arc::new(config), store.clone())
            .with_clock(clock.clone());
        Self {
            engine,
            store,
            clock,
        }
    }

    pub async fn register(&self, name: &str, email: &str) -> Identity {
        self.engine
            .register(NewIdentity {
                name: name.to_string(),
                email: email.to_string(),
                password: SecretString::from(PASSWORD),
            })
            .await
            .unwrap()
    }

    pub async fn identity(&self, id: &str) -> Identity {
        self.store.fetch_identity(id).await.unwrap()
    }
}

pub fn token_of(issued: &IssuedChallenge) -> String {
    match &issued.artifact {
        ChallengeArtifact::SignedClaim { token, .. } => token.clone(),
        other => panic!("expected a signed claim, got {other:?}"),
    }
}

pub fn code_of(issued: &IssuedChallenge) -> String {
    issued
        .code
        .as_ref()
        .map(|code| code.expose_secret().to_string())
        .unwrap()
}
