use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, Instrument};
use uuid::Uuid;

use super::matcher::{matches_user, rule_allows};
use super::trace::{Decision, Outcome, Scope, TraceEntry};
use crate::errors::AuthzResult;
use crate::models::{Attributes, Binding, ClusterRoleBinding, RoleBinding, RoleKind, RoleRef, Rule, User};
use crate::store::{Context, RbacStore, StoreResult};

/// Decides whether a request is allowed.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// `Ok(false)` is a deny; errors are reserved for bad input and store failures.
    async fn authorize(&self, ctx: &Context, attrs: &Attributes) -> AuthzResult<bool>;
}

/// Role-based authorizer backed by an [`RbacStore`].
///
/// Evaluation order:
/// 1. cluster role bindings -> allow on first matching rule
/// 2. role bindings of the request namespace (namespaced requests only)
/// 3. deny
///
/// Holds no per-request state and re-reads the store on every call.
#[derive(Clone)]
pub struct RbacAuthorizer {
    store: Arc<dyn RbacStore>,
    logger: Option<Dispatch>,
}

impl RbacAuthorizer {
    pub fn new(store: Arc<dyn RbacStore>) -> Self {
        Self { store, logger: None }
    }

    /// Routes this authorizer's diagnostics to `logger` instead of the global subscriber.
    pub fn with_logger(mut self, logger: Dispatch) -> Self {
        self.logger = Some(logger);
        self
    }

    pub async fn authorize_with_trace(&self, ctx: &Context, attrs: &Attributes) -> AuthzResult<Decision> {
        let user = attrs.validate()?;
        let request_id = Uuid::new_v4();

        let evaluation = async move {
            let span = tracing::debug_span!(
                "authorize",
                %request_id,
                username = %user.username,
                verb = %attrs.verb,
                resource = %attrs.resource,
                resource_name = %attrs.resource_name,
                namespace = %attrs.namespace,
                api_group = %attrs.api_group,
                api_version = %attrs.api_version,
                backend = self.store.backend_name(),
            );
            self.evaluate(ctx, attrs, user, request_id).instrument(span).await
        };

        match &self.logger {
            Some(logger) => evaluation.with_subscriber(logger.clone()).await,
            None => evaluation.await,
        }
    }

    async fn evaluate(
        &self,
        ctx: &Context,
        attrs: &Attributes,
        user: &User,
        request_id: Uuid,
    ) -> AuthzResult<Decision> {
        let mut decision = Decision::new(request_id);
        let store = self.store.as_ref();

        if resolve_scope(&ClusterScope { store }, ctx, attrs, user, &mut decision.trace).await? {
            decision.allowed = true;
            return Ok(decision);
        }

        if attrs.has_namespace() {
            let ns_ctx = ctx.clone().with_namespace(attrs.namespace.as_str());
            if resolve_scope(&NamespaceScope { store }, &ns_ctx, attrs, user, &mut decision.trace).await? {
                decision.allowed = true;
                return Ok(decision);
            }
        } else {
            decision.trace.push(TraceEntry::scope(Scope::Namespace, Outcome::Skipped));
        }

        tracing::debug!("unauthorized request");
        Ok(decision)
    }
}

#[async_trait]
impl Authorizer for RbacAuthorizer {
    async fn authorize(&self, ctx: &Context, attrs: &Attributes) -> AuthzResult<bool> {
        let decision = self.authorize_with_trace(ctx, attrs).await?;
        Ok(decision.allowed)
    }
}

/// Where one scope gets its bindings and roles from.
#[async_trait]
trait ScopeSource: Send + Sync {
    type Binding: Binding + 'static;

    fn scope(&self) -> Scope;

    async fn list_bindings(&self, ctx: &Context) -> StoreResult<Vec<Self::Binding>>;

    /// Rules of the referenced role; `None` when the role grants nothing.
    async fn role_rules(&self, ctx: &Context, role_ref: &RoleRef) -> StoreResult<Option<Vec<Rule>>>;
}

struct ClusterScope<'a> {
    store: &'a dyn RbacStore,
}

#[async_trait]
impl<'a> ScopeSource for ClusterScope<'a> {
    type Binding = ClusterRoleBinding;

    fn scope(&self) -> Scope {
        Scope::Cluster
    }

    async fn list_bindings(&self, ctx: &Context) -> StoreResult<Vec<ClusterRoleBinding>> {
        self.store.list_cluster_role_bindings(ctx).await
    }

    // cluster bindings can only grant cluster roles
    async fn role_rules(&self, ctx: &Context, role_ref: &RoleRef) -> StoreResult<Option<Vec<Rule>>> {
        let role = self.store.get_cluster_role(ctx, &role_ref.name).await?;
        Ok(role.map(|r| r.rules))
    }
}

struct NamespaceScope<'a> {
    store: &'a dyn RbacStore,
}

#[async_trait]
impl<'a> ScopeSource for NamespaceScope<'a> {
    type Binding = RoleBinding;

    fn scope(&self) -> Scope {
        Scope::Namespace
    }

    async fn list_bindings(&self, ctx: &Context) -> StoreResult<Vec<RoleBinding>> {
        self.store.list_role_bindings(ctx).await
    }

    async fn role_rules(&self, ctx: &Context, role_ref: &RoleRef) -> StoreResult<Option<Vec<Rule>>> {
        match role_ref.kind {
            RoleKind::Role => Ok(self.store.get_role(ctx, &role_ref.name).await?.map(|r| r.rules)),
            RoleKind::ClusterRole => Ok(self
                .store
                .get_cluster_role(ctx, &role_ref.name)
                .await?
                .map(|r| r.rules)),
        }
    }
}

/// Walks the bindings of one scope and returns `true` on the first rule that
/// allows the request. Missing bindings or roles are skipped; any other store
/// error ends the evaluation.
async fn resolve_scope<S: ScopeSource>(
    source: &S,
    ctx: &Context,
    attrs: &Attributes,
    user: &User,
    trace: &mut Vec<TraceEntry>,
) -> AuthzResult<bool> {
    let scope = source.scope();

    let bindings = match source.list_bindings(ctx).await {
        Ok(bindings) => bindings,
        Err(err) if err.is_not_found() => {
            tracing::debug!(%scope, error = %err, "no bindings found");
            Vec::new()
        }
        Err(err) => {
            tracing::warn!(%scope, error = %err, "could not retrieve bindings");
            return Err(err.into());
        }
    };

    if bindings.is_empty() {
        trace.push(TraceEntry::scope(scope, Outcome::NoBindings));
    }

    for binding in &bindings {
        let name = binding.name();
        let role_ref = binding.role_ref();

        if !matches_user(user, binding.subjects()) {
            tracing::debug!(%scope, binding = name, "user is not a subject of the binding");
            trace.push(TraceEntry::binding(scope, name, role_ref, Outcome::SubjectMismatch));
            continue;
        }

        let rules = match source.role_rules(ctx, role_ref).await {
            Ok(Some(rules)) if !rules.is_empty() => rules,
            Ok(_) => {
                tracing::warn!(%scope, binding = name, role = %role_ref.name, "role is empty");
                trace.push(TraceEntry::binding(scope, name, role_ref, Outcome::RoleEmpty));
                continue;
            }
            Err(err) if err.is_not_found() => {
                tracing::warn!(%scope, binding = name, role = %role_ref.name, "role does not exist");
                trace.push(TraceEntry::binding(scope, name, role_ref, Outcome::RoleNotFound));
                continue;
            }
            Err(err) => {
                tracing::warn!(
                    %scope,
                    binding = name,
                    role = %role_ref.name,
                    error = %err,
                    "could not retrieve the role"
                );
                return Err(err.into());
            }
        };

        for (index, rule) in rules.iter().enumerate() {
            match rule_allows(attrs, rule) {
                Ok(()) => {
                    tracing::debug!(%scope, binding = name, rule = index, "request authorized");
                    trace.push(TraceEntry::binding(scope, name, role_ref, Outcome::Allowed { rule: index }));
                    return Ok(true);
                }
                Err(reason) => {
                    tracing::trace!(%scope, binding = name, rule = ?rule, %reason, "rule does not apply");
                    trace.push(TraceEntry::binding(
                        scope,
                        name,
                        role_ref,
                        Outcome::RuleDenied { rule: index, reason },
                    ));
                }
            }
        }

        tracing::debug!(%scope, binding = name, "binding did not authorize the request");
    }

    tracing::debug!(%scope, "no binding authorized the request");
    Ok(false)
}
