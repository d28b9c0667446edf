use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use rbac_authz::authz::{rule_allows, DenyReason, Outcome, Scope};
use rbac_authz::models::{
    Attributes, ClusterRole, ClusterRoleBinding, Role, RoleBinding, RoleRef, Rule, Subject, User,
};
use rbac_authz::store::{Context, MemoryStore, RbacStore, StoreError, StoreResult};
use rbac_authz::{Authorizer, AuthzError, RbacAuthorizer};

/// Wraps a `MemoryStore`, records every call and can fail chosen ones.
#[derive(Default)]
struct RecordingStore {
    inner: MemoryStore,
    calls: Mutex<Vec<&'static str>>,
    fail_on: Option<&'static str>,
    delay: Option<Duration>,
}

impl RecordingStore {
    fn new(inner: MemoryStore) -> Self {
        Self { inner, ..Self::default() }
    }

    fn failing_on(mut self, call: &'static str) -> Self {
        self.fail_on = Some(call);
        self
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    async fn enter(&self, ctx: &Context, call: &'static str) -> StoreResult<()> {
        self.calls.lock().unwrap().push(call);
        if self.fail_on == Some(call) {
            return Err(StoreError::Unexpected(anyhow::anyhow!("{call} exploded")));
        }
        if let Some(delay) = self.delay {
            ctx.run(async {
                tokio::time::sleep(delay).await;
                Ok::<_, StoreError>(())
            })
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RbacStore for RecordingStore {
    async fn list_cluster_role_bindings(&self, ctx: &Context) -> StoreResult<Vec<ClusterRoleBinding>> {
        self.enter(ctx, "list_cluster_role_bindings").await?;
        self.inner.list_cluster_role_bindings(ctx).await
    }

    async fn get_cluster_role(&self, ctx: &Context, name: &str) -> StoreResult<Option<ClusterRole>> {
        self.enter(ctx, "get_cluster_role").await?;
        self.inner.get_cluster_role(ctx, name).await
    }

    async fn list_role_bindings(&self, ctx: &Context) -> StoreResult<Vec<RoleBinding>> {
        self.enter(ctx, "list_role_bindings").await?;
        self.inner.list_role_bindings(ctx).await
    }

    async fn get_role(&self, ctx: &Context, name: &str) -> StoreResult<Option<Role>> {
        self.enter(ctx, "get_role").await?;
        self.inner.get_role(ctx, name).await
    }

    fn backend_name(&self) -> &'static str {
        "recording"
    }
}

fn alice() -> User {
    User::new("alice")
}

fn get_checks() -> Attributes {
    Attributes::new("get", "checks").with_user(alice())
}

fn cluster_binding(name: &str, role: &str, subjects: Vec<Subject>) -> ClusterRoleBinding {
    ClusterRoleBinding {
        name: name.into(),
        role_ref: RoleRef::cluster_role(role),
        subjects,
    }
}

fn role_binding(namespace: &str, name: &str, role_ref: RoleRef, subjects: Vec<Subject>) -> RoleBinding {
    RoleBinding {
        name: name.into(),
        namespace: namespace.into(),
        role_ref,
        subjects,
    }
}

fn authorizer(store: Arc<dyn RbacStore>) -> RbacAuthorizer {
    RbacAuthorizer::new(store)
}

#[tokio::test]
async fn group_binding_does_not_match_user_without_groups() {
    let store = MemoryStore::new();
    store
        .put_cluster_role(ClusterRole { name: "admin".into(), rules: vec![Rule::new(["*"], ["*"])] })
        .await;
    store
        .put_cluster_role_binding(cluster_binding("ops-admins", "admin", vec![Subject::group("ops")]))
        .await;

    let allowed = authorizer(Arc::new(store))
        .authorize(&Context::new(), &get_checks())
        .await
        .expect("no error");
    assert!(!allowed);
}

#[tokio::test]
async fn wildcard_rule_allows_named_user() {
    let store = MemoryStore::new();
    store
        .put_cluster_role(ClusterRole { name: "admin".into(), rules: vec![Rule::new(["*"], ["*"])] })
        .await;
    store
        .put_cluster_role_binding(cluster_binding("alice-admin", "admin", vec![Subject::user("alice")]))
        .await;

    let decision = authorizer(Arc::new(store))
        .authorize_with_trace(&Context::new(), &get_checks())
        .await
        .expect("no error");
    assert!(decision.allowed);

    let granted = decision.granted_by().expect("granting entry");
    assert_eq!(granted.scope, Scope::Cluster);
    assert_eq!(granted.binding.as_deref(), Some("alice-admin"));
    assert_eq!(granted.outcome, Outcome::Allowed { rule: 0 });
}

#[tokio::test]
async fn missing_cluster_role_falls_through_to_namespace() {
    let store = MemoryStore::new();
    store
        .put_cluster_role_binding(cluster_binding("dangling", "ghost", vec![Subject::user("alice")]))
        .await;
    store
        .put_role(Role {
            name: "viewer".into(),
            namespace: "default".into(),
            rules: vec![Rule::new(["get"], ["checks"])],
        })
        .await;
    store
        .put_role_binding(role_binding("default", "viewers", RoleRef::role("viewer"), vec![Subject::user("alice")]))
        .await;

    let store = Arc::new(RecordingStore::new(store));
    let attrs = get_checks().with_namespace("default");
    let decision = authorizer(store.clone())
        .authorize_with_trace(&Context::new(), &attrs)
        .await
        .expect("missing role is not an error");

    assert!(decision.allowed);
    assert!(decision
        .trace
        .iter()
        .any(|e| e.scope == Scope::Cluster && e.outcome == Outcome::RoleNotFound));
    assert_eq!(decision.granted_by().map(|e| e.scope), Some(Scope::Namespace));
    assert_eq!(
        store.calls(),
        vec!["list_cluster_role_bindings", "get_cluster_role", "list_role_bindings", "get_role"]
    );
}

#[tokio::test]
async fn missing_cluster_role_without_namespace_denies() {
    let store = MemoryStore::new();
    store
        .put_cluster_role_binding(cluster_binding("dangling", "ghost", vec![Subject::user("alice")]))
        .await;

    let allowed = authorizer(Arc::new(store))
        .authorize(&Context::new(), &get_checks())
        .await
        .expect("no error");
    assert!(!allowed);
}

#[test]
fn matcher_reports_forbidden_verb() {
    let rule = Rule::new(["get"], ["checks"]).with_resource_names(["check-cpu"]);
    let attrs = Attributes::new("delete", "checks")
        .with_resource_name("check-cpu")
        .with_user(alice());

    let reason = rule_allows(&attrs, &rule).unwrap_err();
    assert_eq!(reason, DenyReason::ForbiddenVerb);
    assert_eq!(reason.to_string(), "forbidden verb");
}

#[tokio::test]
async fn deny_trace_carries_rule_reason() {
    let store = MemoryStore::new();
    store
        .put_cluster_role(ClusterRole {
            name: "check-reader".into(),
            rules: vec![Rule::new(["get"], ["checks"]).with_resource_names(["check-cpu"])],
        })
        .await;
    store
        .put_cluster_role_binding(cluster_binding("readers", "check-reader", vec![Subject::user("alice")]))
        .await;

    let attrs = Attributes::new("delete", "checks")
        .with_resource_name("check-cpu")
        .with_user(alice());
    let decision = authorizer(Arc::new(store))
        .authorize_with_trace(&Context::new(), &attrs)
        .await
        .unwrap();

    assert!(!decision.allowed);
    assert!(decision.trace.iter().any(|e| e.outcome
        == Outcome::RuleDenied { rule: 0, reason: DenyReason::ForbiddenVerb }));
}

#[tokio::test]
async fn cluster_allow_short_circuits_namespace_scope() {
    let store = MemoryStore::new();
    store
        .put_cluster_role(ClusterRole { name: "admin".into(), rules: vec![Rule::new(["*"], ["*"])] })
        .await;
    store
        .put_cluster_role_binding(cluster_binding("alice-admin", "admin", vec![Subject::user("alice")]))
        .await;
    store
        .put_role_binding(role_binding("default", "viewers", RoleRef::role("viewer"), vec![Subject::user("alice")]))
        .await;

    let store = Arc::new(RecordingStore::new(store).failing_on("list_role_bindings"));
    let attrs = get_checks().with_namespace("default");
    let allowed = authorizer(store.clone())
        .authorize(&Context::new(), &attrs)
        .await
        .expect("namespace scope never read");

    assert!(allowed);
    assert!(!store.calls().contains(&"list_role_bindings"));
}

#[tokio::test]
async fn first_matching_binding_stops_evaluation() {
    let store = MemoryStore::new();
    store
        .put_cluster_role(ClusterRole { name: "admin".into(), rules: vec![Rule::new(["*"], ["*"])] })
        .await;
    store
        .put_cluster_role(ClusterRole { name: "other".into(), rules: vec![Rule::new(["*"], ["*"])] })
        .await;
    store
        .put_cluster_role_binding(cluster_binding("first", "admin", vec![Subject::user("alice")]))
        .await;
    store
        .put_cluster_role_binding(cluster_binding("second", "other", vec![Subject::user("alice")]))
        .await;

    let store = Arc::new(RecordingStore::new(store));
    let allowed = authorizer(store.clone())
        .authorize(&Context::new(), &get_checks())
        .await
        .unwrap();

    assert!(allowed);
    assert_eq!(store.calls(), vec!["list_cluster_role_bindings", "get_cluster_role"]);
}

#[tokio::test]
async fn empty_namespace_never_reads_role_bindings() {
    let store = MemoryStore::new();
    store
        .put_role(Role {
            name: "viewer".into(),
            namespace: "default".into(),
            rules: vec![Rule::new(["*"], ["*"])],
        })
        .await;
    store
        .put_role_binding(role_binding("default", "viewers", RoleRef::role("viewer"), vec![Subject::user("alice")]))
        .await;

    let store = Arc::new(RecordingStore::new(store));
    let decision = authorizer(store.clone())
        .authorize_with_trace(&Context::new(), &get_checks())
        .await
        .unwrap();

    assert!(!decision.allowed);
    assert!(!decision.consulted(Scope::Namespace));
    assert_eq!(store.calls(), vec!["list_cluster_role_bindings"]);
}

#[tokio::test]
async fn role_binding_can_reference_cluster_role() {
    let store = MemoryStore::new();
    store
        .put_cluster_role(ClusterRole { name: "editor".into(), rules: vec![Rule::new(["create", "update"], ["checks"])] })
        .await;
    store
        .put_role_binding(role_binding(
            "prod",
            "editors",
            RoleRef::cluster_role("editor"),
            vec![Subject::group("ops")],
        ))
        .await;

    let authorizer = authorizer(Arc::new(store));
    let ops = User::new("alice").with_groups(["ops"]);

    let in_prod = Attributes::new("create", "checks").with_namespace("prod").with_user(ops.clone());
    assert!(authorizer.authorize(&Context::new(), &in_prod).await.unwrap());

    let in_dev = Attributes::new("create", "checks").with_namespace("dev").with_user(ops);
    assert!(!authorizer.authorize(&Context::new(), &in_dev).await.unwrap());
}

#[tokio::test]
async fn empty_role_is_skipped() {
    let store = MemoryStore::new();
    store.put_cluster_role(ClusterRole { name: "noop".into(), rules: vec![] }).await;
    store
        .put_cluster_role_binding(cluster_binding("noop", "noop", vec![Subject::user("alice")]))
        .await;

    let decision = authorizer(Arc::new(store))
        .authorize_with_trace(&Context::new(), &get_checks())
        .await
        .unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.trace[0].outcome, Outcome::RoleEmpty);
}

#[tokio::test]
async fn not_found_listings_are_a_plain_deny() {
    let authorizer = authorizer(Arc::new(MemoryStore::new()));
    let attrs = get_checks().with_namespace("default");

    let decision = authorizer.authorize_with_trace(&Context::new(), &attrs).await.unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.trace.len(), 2);
    assert!(decision.trace.iter().all(|e| e.outcome == Outcome::NoBindings));
}

#[tokio::test]
async fn store_failures_propagate() {
    let seed = || async {
        let store = MemoryStore::new();
        store
            .put_cluster_role_binding(cluster_binding("alice", "admin", vec![Subject::user("alice")]))
            .await;
        store
            .put_role_binding(role_binding("default", "viewers", RoleRef::role("viewer"), vec![Subject::user("alice")]))
            .await;
        store
    };
    let attrs = get_checks().with_namespace("default");

    for call in ["list_cluster_role_bindings", "get_cluster_role", "list_role_bindings", "get_role"] {
        let store = Arc::new(RecordingStore::new(seed().await).failing_on(call));
        let err = authorizer(store.clone())
            .authorize(&Context::new(), &attrs)
            .await
            .expect_err("store failure must surface");

        match err {
            AuthzError::Store(StoreError::Unexpected(inner)) => {
                assert_eq!(inner.to_string(), format!("{call} exploded"));
            }
            other => panic!("{call}: unexpected error {other:?}"),
        }
        assert_eq!(store.calls().last(), Some(&call), "evaluation continued after {call}");
    }
}

#[tokio::test]
async fn invalid_attributes_never_touch_the_store() {
    let store = Arc::new(RecordingStore::new(MemoryStore::new()));
    let authorizer = authorizer(store.clone());

    let anonymous = Attributes::new("get", "checks");
    let err = authorizer.authorize(&Context::new(), &anonymous).await.unwrap_err();
    assert!(matches!(err, AuthzError::InvalidArgument(_)));

    let no_verb = Attributes::new("", "checks").with_user(alice());
    let err = authorizer.authorize(&Context::new(), &no_verb).await.unwrap_err();
    assert!(matches!(err, AuthzError::InvalidArgument(_)));

    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn cancelled_context_aborts_evaluation() {
    let token = CancellationToken::new();
    token.cancel();
    let ctx = Context::new().with_cancellation(token);

    let err = authorizer(Arc::new(MemoryStore::new()))
        .authorize(&ctx, &get_checks())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthzError::Store(StoreError::Cancelled)));
}

#[tokio::test]
async fn deadline_expiring_mid_evaluation_is_reported() {
    let store = MemoryStore::new();
    store
        .put_cluster_role_binding(cluster_binding("alice", "admin", vec![Subject::user("alice")]))
        .await;
    let store = Arc::new(RecordingStore::new(store).slow(Duration::from_millis(200)));
    let ctx = Context::new().with_timeout(Duration::from_millis(50));

    let err = authorizer(store)
        .authorize(&ctx, &get_checks())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthzError::Store(StoreError::DeadlineExceeded)));
}

#[tokio::test]
async fn concurrent_calls_share_one_authorizer() {
    let store = MemoryStore::new();
    store
        .put_cluster_role(ClusterRole { name: "reader".into(), rules: vec![Rule::new(["get"], ["*"])] })
        .await;
    store
        .put_cluster_role_binding(cluster_binding("readers", "reader", vec![Subject::group("ops")]))
        .await;
    let authorizer = Arc::new(authorizer(Arc::new(store)));

    let mut handles = Vec::new();
    for i in 0..16 {
        let authorizer = authorizer.clone();
        handles.push(tokio::spawn(async move {
            let user = if i % 2 == 0 { User::new("alice").with_groups(["ops"]) } else { User::new("bob") };
            let attrs = Attributes::new("get", "checks").with_user(user);
            (i, authorizer.authorize(&Context::new(), &attrs).await.unwrap())
        }));
    }

    for handle in handles {
        let (i, allowed) = handle.await.unwrap();
        assert_eq!(allowed, i % 2 == 0);
    }
}

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Capture {
    type Writer = Capture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test]
async fn diagnostics_go_to_the_injected_logger() {
    let store = MemoryStore::new();
    store
        .put_cluster_role(ClusterRole {
            name: "check-reader".into(),
            rules: vec![Rule::new(["get"], ["checks"])],
        })
        .await;
    store
        .put_cluster_role_binding(cluster_binding("readers", "check-reader", vec![Subject::user("alice")]))
        .await;

    let capture = Capture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .with_writer(capture.clone())
        .finish();

    let authorizer = authorizer(Arc::new(store)).with_logger(tracing::Dispatch::new(subscriber));
    let attrs = Attributes::new("delete", "checks").with_user(alice());
    assert!(!authorizer.authorize(&Context::new(), &attrs).await.unwrap());

    let output = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
    assert!(output.contains("forbidden verb"), "missing deny reason in: {output}");
    assert!(output.contains("readers"), "missing binding name in: {output}");
}
