//! The authentication pipeline run against every new connection.
//!
//! A pipeline is an ordered list of [`AuthStage`]s. Each stage looks at
//! the connection's [`AuthContext`] and either passes or produces an
//! identity. Stages never mutate the context; the pipeline attaches the
//! first identity produced and skips everything after it.
//!
//! ```text
//! handshake ──→ [token stage] ──pass──→ [session stage] ──pass──→ unauthenticated
//!                    │                        │
//!               identity ──→ attach      identity ──→ attach
//! ```
//!
//! A stage error aborts the run. The caller decides whether that rejects
//! the connection or lets it continue unauthenticated.

use std::sync::Arc;

use beacon_protocol::Identity;
use beacon_transport::{ConnectionId, Handshake};
use futures_util::future::BoxFuture;

use crate::{AuthError, CredentialResolver};

/// Everything a stage may look at while authenticating one connection.
#[derive(Debug, Clone)]
pub struct AuthContext {
    conn_id: ConnectionId,
    handshake: Handshake,
    identity: Option<Identity>,
    credential: Option<String>,
}

impl AuthContext {
    pub fn new(conn_id: ConnectionId, handshake: Handshake) -> Self {
        Self {
            conn_id,
            handshake,
            identity: None,
            credential: None,
        }
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// The credential that produced the attached identity.
    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// Consumes the context, returning the attached identity and the
    /// credential that proved it.
    pub fn into_identity(self) -> Option<(Identity, String)> {
        self.identity.zip(self.credential)
    }

    fn attach(&mut self, identity: Identity, credential: String) {
        self.identity = Some(identity);
        self.credential = Some(credential);
    }
}

/// What a stage decided.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// Nothing applicable here; move on to the next stage.
    Pass,
    /// The stage resolved an identity from `credential`.
    Authenticated {
        identity: Identity,
        credential: String,
    },
}

/// One step of the pipeline.
///
/// Stages are stored as trait objects, so `run` returns a boxed future.
pub trait AuthStage: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn run<'a>(
        &'a self,
        ctx: &'a AuthContext,
    ) -> BoxFuture<'a, Result<StageOutcome, AuthError>>;
}

/// Resolves a credential and maps "found" to `Authenticated`.
async fn resolve_with<R: CredentialResolver>(
    resolver: &R,
    credential: &str,
) -> Result<StageOutcome, AuthError> {
    Ok(match resolver.resolve(credential).await? {
        Some(identity) => StageOutcome::Authenticated {
            identity,
            credential: credential.to_string(),
        },
        None => StageOutcome::Pass,
    })
}

/// Authenticates from the handshake's bearer token.
pub struct TokenStage<R> {
    resolver: Arc<R>,
}

impl<R: CredentialResolver> TokenStage<R> {
    /// The resolver is shared so the gateway can reuse it for in-band
    /// logins.
    pub fn new(resolver: Arc<R>) -> Self {
        Self { resolver }
    }
}

impl<R: CredentialResolver> AuthStage for TokenStage<R> {
    fn name(&self) -> &'static str {
        "token"
    }

    fn run<'a>(
        &'a self,
        ctx: &'a AuthContext,
    ) -> BoxFuture<'a, Result<StageOutcome, AuthError>> {
        Box::pin(async move {
            match ctx.handshake().bearer_token() {
                Some(token) => resolve_with(&*self.resolver, token).await,
                None => Ok(StageOutcome::Pass),
            }
        })
    }
}

/// Authenticates from the handshake's session reference.
pub struct SessionStage<R> {
    resolver: Arc<R>,
}

impl<R: CredentialResolver> SessionStage<R> {
    pub fn new(resolver: Arc<R>) -> Self {
        Self { resolver }
    }
}

impl<R: CredentialResolver> AuthStage for SessionStage<R> {
    fn name(&self) -> &'static str {
        "session"
    }

    fn run<'a>(
        &'a self,
        ctx: &'a AuthContext,
    ) -> BoxFuture<'a, Result<StageOutcome, AuthError>> {
        Box::pin(async move {
            match ctx.handshake().session_ref() {
                Some(session_ref) => {
                    resolve_with(&*self.resolver, session_ref).await
                }
                None => Ok(StageOutcome::Pass),
            }
        })
    }
}

/// An ordered chain of stages.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn AuthStage>>,
}

impl Pipeline {
    /// Creates an empty pipeline. Every connection stays unauthenticated
    /// until stages are added.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage. Stages run in the order they were added.
    pub fn stage(mut self, stage: impl AuthStage) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Appends an already-boxed stage.
    pub fn push(&mut self, stage: Box<dyn AuthStage>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs the stages against `ctx`, attaching the first identity found.
    ///
    /// Returns as soon as an identity is attached. A stage error stops
    /// the run; any identity attached before it is kept.
    pub async fn run(&self, ctx: &mut AuthContext) -> Result<(), AuthError> {
        for stage in &self.stages {
            if ctx.is_authenticated() {
                break;
            }
            let outcome = stage.run(ctx).await.inspect_err(|e| {
                tracing::debug!(
                    conn_id = %ctx.conn_id(),
                    stage = stage.name(),
                    error = %e,
                    "auth stage failed"
                );
            })?;
            if let StageOutcome::Authenticated {
                identity,
                credential,
            } = outcome
            {
                tracing::debug!(
                    conn_id = %ctx.conn_id(),
                    stage = stage.name(),
                    identity_id = %identity.id,
                    "identity attached"
                );
                ctx.attach(identity, credential);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use beacon_protocol::IdentityId;

    /// Resolves any credential starting with `prefix`, counting calls.
    struct PrefixResolver {
        prefix: &'static str,
        calls: AtomicUsize,
    }

    impl PrefixResolver {
        fn new(prefix: &'static str) -> Arc<Self> {
            Arc::new(Self {
                prefix,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CredentialResolver for PrefixResolver {
        async fn resolve(
            &self,
            credential: &str,
        ) -> Result<Option<Identity>, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if credential == "boom" {
                return Err(AuthError::CredentialInvalid("boom".into()));
            }
            Ok(credential
                .strip_prefix(self.prefix)
                .map(Identity::new))
        }
    }

    fn ctx(handshake: Handshake) -> AuthContext {
        AuthContext::new(ConnectionId::new(1), handshake)
    }

    #[tokio::test]
    async fn test_run_no_credentials_stays_unauthenticated() {
        let tokens = PrefixResolver::new("t-");
        let sessions = PrefixResolver::new("s-");
        let pipeline = Pipeline::new()
            .stage(TokenStage::new(Arc::clone(&tokens)))
            .stage(SessionStage::new(Arc::clone(&sessions)));
        let mut ctx = ctx(Handshake::new());

        pipeline.run(&mut ctx).await.unwrap();

        assert!(!ctx.is_authenticated());
        assert_eq!(tokens.calls(), 0, "no token means no lookup");
        assert_eq!(sessions.calls(), 0);
    }

    #[tokio::test]
    async fn test_run_token_stage_wins_and_skips_session() {
        let tokens = PrefixResolver::new("t-");
        let sessions = PrefixResolver::new("s-");
        let pipeline = Pipeline::new()
            .stage(TokenStage::new(Arc::clone(&tokens)))
            .stage(SessionStage::new(Arc::clone(&sessions)));
        let mut ctx = ctx(
            Handshake::new()
                .with_query("authToken", "t-alice")
                .with_query("sessionId", "s-bob"),
        );

        pipeline.run(&mut ctx).await.unwrap();

        assert_eq!(ctx.identity().unwrap().id, IdentityId::new("alice"));
        assert_eq!(ctx.credential(), Some("t-alice"));
        assert_eq!(sessions.calls(), 0, "session stage must be skipped");
    }

    #[tokio::test]
    async fn test_run_absent_token_falls_through_to_session() {
        let tokens = PrefixResolver::new("t-");
        let sessions = PrefixResolver::new("s-");
        let pipeline = Pipeline::new()
            .stage(TokenStage::new(Arc::clone(&tokens)))
            .stage(SessionStage::new(Arc::clone(&sessions)));
        let mut ctx = ctx(
            Handshake::new()
                .with_query("authToken", "unknown")
                .with_header("cookie", "sid=s-bob"),
        );

        pipeline.run(&mut ctx).await.unwrap();

        assert_eq!(tokens.calls(), 1);
        assert_eq!(ctx.identity().unwrap().id, IdentityId::new("bob"));
    }

    #[tokio::test]
    async fn test_run_stage_error_aborts() {
        let tokens = PrefixResolver::new("t-");
        let sessions = PrefixResolver::new("s-");
        let pipeline = Pipeline::new()
            .stage(TokenStage::new(Arc::clone(&tokens)))
            .stage(SessionStage::new(Arc::clone(&sessions)));
        let mut ctx = ctx(
            Handshake::new()
                .with_query("authToken", "boom")
                .with_query("sessionId", "s-bob"),
        );

        let result = pipeline.run(&mut ctx).await;

        assert!(matches!(result, Err(AuthError::CredentialInvalid(_))));
        assert!(!ctx.is_authenticated());
        assert_eq!(sessions.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_pipeline_is_noop() {
        let pipeline = Pipeline::new();
        let mut ctx = ctx(Handshake::new().with_query("authToken", "t-x"));

        pipeline.run(&mut ctx).await.unwrap();

        assert!(pipeline.is_empty());
        assert!(ctx.into_identity().is_none());
    }
}
