//! Provider Registry
//!
//! Builds one `ProviderAdapter` per provider from explicit configuration.
//! Adapters are memoized; credential overrides get a fresh, unmemoized
//! adapter sharing the same transport and context.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use super::adapter::{AdapterContext, ProviderAdapter};
use super::gemini::GeminiTransport;
use super::openai::OpenAiTransport;
use super::{ProviderKind, SharedTransport};
use crate::config::{Config, LlmConfig, ProvidersConfig};
use crate::types::Result;

/// Adapter factory with fallback resolution
pub struct ProviderRegistry {
    llm: LlmConfig,
    providers: ProvidersConfig,
    credentials: HashMap<ProviderKind, Option<SecretString>>,
    transports: DashMap<ProviderKind, SharedTransport>,
    adapters: DashMap<ProviderKind, Arc<ProviderAdapter>>,
    ctx: AdapterContext,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let configured: Vec<_> = ProviderKind::ALL
            .into_iter()
            .filter(|k| self.has_credential(*k))
            .collect();
        f.debug_struct("ProviderRegistry")
            .field("default_provider", &self.llm.default_provider)
            .field("fallback_provider", &self.llm.fallback_provider)
            .field("configured", &configured)
            .finish()
    }
}

impl ProviderRegistry {
    /// Registry over `config`, resolving API keys from config then environment
    pub fn from_config(config: &Config, ctx: AdapterContext) -> Self {
        let credentials = ProviderKind::ALL
            .into_iter()
            .map(|kind| (kind, config.providers.get(kind).resolve_api_key(kind)))
            .collect();

        Self {
            llm: config.llm.clone(),
            providers: config.providers.clone(),
            credentials,
            transports: DashMap::new(),
            adapters: DashMap::new(),
            ctx,
        }
    }

    /// Replace the transport used for `kind`
    pub fn with_transport(self, kind: ProviderKind, transport: SharedTransport) -> Self {
        self.adapters.remove(&kind);
        self.transports.insert(kind, transport);
        self
    }

    /// Replace the configured credential for `kind`
    pub fn with_credential(mut self, kind: ProviderKind, credential: Option<SecretString>) -> Self {
        self.adapters.remove(&kind);
        self.credentials.insert(kind, credential);
        self
    }

    pub fn default_provider(&self) -> ProviderKind {
        self.llm.default_provider
    }

    pub fn fallback_provider(&self) -> Option<ProviderKind> {
        self.llm.fallback_provider
    }

    pub fn has_credential(&self, kind: ProviderKind) -> bool {
        self.credentials.get(&kind).is_some_and(Option::is_some)
    }

    pub fn context(&self) -> &AdapterContext {
        &self.ctx
    }

    /// Memoized adapter for `kind` with its configured credential
    pub fn adapter(&self, kind: ProviderKind) -> Result<Arc<ProviderAdapter>> {
        if let Some(adapter) = self.adapters.get(&kind) {
            return Ok(Arc::clone(adapter.value()));
        }

        let credential = self.credentials.get(&kind).cloned().flatten();
        let adapter = Arc::new(self.build(kind, credential)?);
        debug!(provider = %kind, "Created provider adapter");

        Ok(Arc::clone(
            self.adapters.entry(kind).or_insert(adapter).value(),
        ))
    }

    /// Fresh adapter for `kind` bound to `credential`; not memoized
    ///
    /// Unless `credential` is the configured key, the adapter's cache entries
    /// are partitioned by the credential fingerprint.
    pub fn create_with_credential(
        &self,
        kind: ProviderKind,
        credential: SecretString,
    ) -> Result<ProviderAdapter> {
        let configured = self
            .credentials
            .get(&kind)
            .and_then(Option::as_ref)
            .is_some_and(|own| own.expose_secret() == credential.expose_secret());
        let adapter = self.build(kind, Some(credential))?;
        Ok(if configured {
            adapter
        } else {
            adapter.with_isolated_cache()
        })
    }

    /// Adapter for `kind`, or for the fallback provider when `kind` has no
    /// credential and the fallback does
    pub fn resolve(&self, kind: ProviderKind) -> Result<Arc<ProviderAdapter>> {
        if !self.has_credential(kind)
            && let Some(fallback) = self.llm.fallback_provider.filter(|f| *f != kind)
            && self.has_credential(fallback)
        {
            warn!(
                requested = %kind,
                fallback = %fallback,
                "Provider has no credential, using fallback provider"
            );
            return self.adapter(fallback);
        }
        self.adapter(kind)
    }

    fn build(&self, kind: ProviderKind, credential: Option<SecretString>) -> Result<ProviderAdapter> {
        let transport = self.transport(kind)?;
        let default_model = self
            .providers
            .get(kind)
            .default_model
            .clone()
            .unwrap_or_else(|| kind.default_model().to_string());

        Ok(
            ProviderAdapter::new(kind, transport, credential, self.ctx.clone())
                .with_default_model(default_model)
                .with_max_retries(self.llm.max_retries),
        )
    }

    fn transport(&self, kind: ProviderKind) -> Result<SharedTransport> {
        if let Some(transport) = self.transports.get(&kind) {
            return Ok(Arc::clone(transport.value()));
        }

        let api_base = self.providers.get(kind).api_base.clone();
        let timeout = Duration::from_secs(self.llm.timeout_secs);
        let transport: SharedTransport = match kind {
            ProviderKind::OpenAi => Arc::new(OpenAiTransport::new(api_base, timeout)?),
            ProviderKind::Gemini => Arc::new(GeminiTransport::new(api_base, timeout)?),
        };

        Ok(Arc::clone(
            self.transports.entry(kind).or_insert(transport).value(),
        ))
    }
}
