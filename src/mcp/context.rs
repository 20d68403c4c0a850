//! Per-request context bundle
//!
//! Every handler receives an explicit [`RequestContext`]: resolved config,
//! optional session, secrets view, role registry, context headers and
//! workspace identifiers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::auth::{RoleRegistry, Session};
use crate::config::ai_proxy::{TOKEN_SECRET, URL_SECRET};
use crate::config::Config;
use crate::mcp::types::RequestMeta;

/// Prefix of environment variables exposed as secrets
pub const SECRET_PREFIX: &str = "SECRET_";

/// Context headers the server accepts from the hosting manager
pub const CONTEXT_HEADERS: &[&str] = &["project-id", "environment", "custom-tag"];

/// Read-only secret lookup. Values never appear in `Debug` output.
#[derive(Clone, Default)]
pub struct Secrets {
    values: BTreeMap<String, String>,
}

impl Secrets {
    /// Collect `SECRET_*` variables and the AI proxy URL/token
    pub fn from_env_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let values = vars
            .into_iter()
            .filter(|(key, _)| {
                key.starts_with(SECRET_PREFIX) || key == URL_SECRET || key == TOKEN_SECRET
            })
            .collect();
        Self { values }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value for `key`; empty values count as absent
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Context bundle handed to every handler
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub config: Arc<Config>,
    pub session: Option<Session>,
    pub secrets: Arc<Secrets>,
    pub roles: Arc<RoleRegistry>,
    pub context_headers: BTreeMap<String, String>,
    pub workspace_id: Option<String>,
    pub project_root: Option<String>,
}

impl RequestContext {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            session: None,
            secrets: Arc::new(Secrets::default()),
            roles: Arc::new(RoleRegistry::default()),
            context_headers: BTreeMap::new(),
            workspace_id: None,
            project_root: None,
        }
    }

    pub fn with_session(mut self, session: Option<Session>) -> Self {
        self.session = session;
        self
    }

    pub fn with_secrets(mut self, secrets: Arc<Secrets>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_roles(mut self, roles: Arc<RoleRegistry>) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_workspace(
        mut self,
        workspace_id: Option<String>,
        project_root: Option<String>,
    ) -> Self {
        self.workspace_id = workspace_id;
        self.project_root = project_root;
        self
    }

    /// Evaluate `role` against the current session
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.authorize(self.session.as_ref(), role)
    }

    /// Derive the context for one request from its `_meta` block.
    ///
    /// Only declared context headers are kept; workspace identifiers in the
    /// request override the connection defaults.
    pub fn for_request(&self, meta: RequestMeta) -> Self {
        let mut ctx = self.clone();
        ctx.context_headers = meta
            .context_headers
            .into_iter()
            .filter(|(name, _)| CONTEXT_HEADERS.contains(&name.to_ascii_lowercase().as_str()))
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        if meta.workspace_id.is_some() {
            ctx.workspace_id = meta.workspace_id;
        }
        if meta.project_root.is_some() {
            ctx.project_root = meta.project_root;
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::USER_ROLE;

    #[test]
    fn test_secrets_from_env() {
        let vars = vec![
            ("SECRET_NEWSAPI_KEY".to_string(), "abc".to_string()),
            ("MCP_AI_PROXY_URL".to_string(), "http://localhost".to_string()),
            ("HOME".to_string(), "/root".to_string()),
        ];
        let secrets = Secrets::from_env_vars(vars);
        assert_eq!(secrets.get("SECRET_NEWSAPI_KEY"), Some("abc"));
        assert!(secrets.contains("MCP_AI_PROXY_URL"));
        assert!(!secrets.contains("HOME"));
    }

    #[test]
    fn test_secret_keys_listed_without_values() {
        let secrets = Secrets::from_pairs([
            ("SECRET_NEWSAPI_KEY", "abc"),
            ("MCP_AI_PROXY_TOKEN", "tok"),
        ]);
        let mut keys: Vec<&str> = secrets.keys().collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["MCP_AI_PROXY_TOKEN", "SECRET_NEWSAPI_KEY"]);
    }

    #[test]
    fn test_empty_secret_is_absent() {
        let secrets = Secrets::from_pairs([("SECRET_NEWSAPI_KEY", "")]);
        assert_eq!(secrets.get("SECRET_NEWSAPI_KEY"), None);
    }

    #[test]
    fn test_secrets_debug_redacts_values() {
        let secrets = Secrets::from_pairs([("SECRET_NEWSAPI_KEY", "supersecretvalue")]);
        let debug = format!("{:?}", secrets);
        assert!(debug.contains("SECRET_NEWSAPI_KEY"));
        assert!(!debug.contains("supersecretvalue"));
    }

    #[test]
    fn test_has_role() {
        let ctx = RequestContext::new(Arc::new(Config::default()));
        assert!(!ctx.has_role(USER_ROLE));

        let session = Session::new("a@b.com", None).unwrap();
        let ctx = ctx.with_session(Some(session));
        assert!(ctx.has_role(USER_ROLE));
    }

    #[test]
    fn test_for_request_filters_headers() {
        let base = RequestContext::new(Arc::new(Config::default()))
            .with_workspace(Some("ws-default".to_string()), None);

        let mut headers = BTreeMap::new();
        headers.insert("Project-Id".to_string(), "p1".to_string());
        headers.insert("x-evil".to_string(), "nope".to_string());

        let ctx = base.for_request(RequestMeta {
            context_headers: headers,
            workspace_id: None,
            project_root: Some("/work".to_string()),
        });

        assert_eq!(ctx.context_headers.get("project-id").map(String::as_str), Some("p1"));
        assert!(!ctx.context_headers.contains_key("x-evil"));
        assert_eq!(ctx.workspace_id.as_deref(), Some("ws-default"));
        assert_eq!(ctx.project_root.as_deref(), Some("/work"));
    }
}
