//! The request pipeline: route, filter, authenticate, gate, hooks, action.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::auth::{AuthProvider, TokenAuth};
use crate::config::{SchemeConfig, Settings};
use crate::error::{GatewayError, GatewayResult};
use crate::guard::{Clock, GateOutcome, ReplayStore, RequestGate, SignatureVerifier};
use crate::hooks::{Hook, HookDispatcher, HookRegistry, HookSpec};
use crate::protocol::{
    is_valid_jsonp_callback, Flow, InboundRequest, InputFilter, Responder, Response, ResponseType,
};

use super::builtin::{builtin_actions, builtin_hooks};
use super::{Action, ActionContext, ActionRegistry};

/// Action lists exempt from login or from permission checks.
#[derive(Debug, Clone, Default)]
pub struct AccessRules {
    pub no_need_login: Vec<String>,
    pub no_need_right: Vec<String>,
}

/// Response negotiation settings.
#[derive(Debug, Clone)]
pub struct ResponseSettings {
    pub default_type: ResponseType,
    pub jsonp_handler: String,
    pub default_jsonp_callback: String,
}

impl Default for ResponseSettings {
    fn default() -> Self {
        Self {
            default_type: ResponseType::Json,
            jsonp_handler: "callback".to_string(),
            default_jsonp_callback: "jsonpReturn".to_string(),
        }
    }
}

/// The gateway in front of every action.
///
/// Requests pass, in order: routing (unknown path gives 404), input
/// filtering, login (401), permission (403), the [`RequestGate`] for
/// actions that need a login, the configured hooks, and finally the
/// action. The first [`Halt`](crate::protocol::Halt) wins.
pub struct ApiController {
    auth: Arc<dyn AuthProvider>,
    gate: RequestGate,
    check_parameters: bool,
    access: AccessRules,
    hooks: HookDispatcher,
    actions: ActionRegistry,
    input_filter: InputFilter,
    response: ResponseSettings,
    clock: Arc<dyn Clock>,
}

impl ApiController {
    pub fn builder(
        auth: Arc<dyn AuthProvider>,
        gate: RequestGate,
        clock: Arc<dyn Clock>,
    ) -> ApiControllerBuilder {
        ApiControllerBuilder {
            auth,
            gate,
            clock,
            check_parameters: true,
            access: AccessRules::default(),
            input_filter: InputFilter::standard(),
            response: ResponseSettings::default(),
            actions: Vec::new(),
            hooks: HookRegistry::new(),
            hook_specs: Vec::new(),
        }
    }

    /// Build the controller described by `settings`, with the bundled
    /// token store and the built-in actions and hooks.
    pub fn from_settings(
        settings: &Settings,
        replay: Arc<dyn ReplayStore>,
        clock: Arc<dyn Clock>,
    ) -> GatewayResult<Self> {
        let guard = &settings.guard;

        let verifier = match guard.scheme {
            SchemeConfig::Md5 => SignatureVerifier::md5(),
            SchemeConfig::HmacSha256 => {
                let path = guard
                    .hmac_secret_path
                    .as_deref()
                    .ok_or_else(|| GatewayError::Config {
                        message: "guard.hmac_secret_path is required for the hmac-sha256 scheme"
                            .to_string(),
                    })?;
                let secret = SignatureVerifier::load_secret(path)?;
                SignatureVerifier::hmac_sha256(&secret)
            }
        };

        let gate = RequestGate::new(verifier, replay, Arc::clone(&clock))
            .with_signature_field(guard.signature_field.as_str())
            .with_required_fields(guard.required_fields.iter().cloned())
            .with_validity_window(guard.validity_window_seconds);

        let auth = Arc::new(TokenAuth::new(settings.auth.tokens.iter().cloned()));

        let mut builder = Self::builder(auth, gate, clock)
            .check_parameters(guard.check_parameters)
            .access(AccessRules {
                no_need_login: settings.access.no_need_login.clone(),
                no_need_right: settings.access.no_need_right.clone(),
            })
            .input_filter(InputFilter::new(settings.input.filters.clone()))
            .response(ResponseSettings {
                default_type: settings.response.default_type,
                jsonp_handler: settings.response.jsonp_handler.clone(),
                default_jsonp_callback: settings.response.default_jsonp_callback.clone(),
            });

        for action in builtin_actions(&guard.signature_field) {
            builder = builder.action(action);
        }
        for (name, hook) in builtin_hooks() {
            builder = builder.hook(name, hook);
        }
        for spec in &settings.hooks {
            builder = builder.before_action(spec.clone());
        }

        builder.build()
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    /// Error envelope in the default encoding, for failures outside the
    /// pipeline (malformed frames, panicked actions).
    pub fn error_response(&self, msg: &str, code: i64) -> Response {
        Responder::new(
            self.response.default_type,
            self.response.default_jsonp_callback.as_str(),
            Arc::clone(&self.clock),
        )
        .error_with_code(msg, None, code)
        .into_response()
    }

    /// Run the pipeline for one request.
    pub fn handle(&self, request: InboundRequest) -> Response {
        let responder = self.responder_for(&request);
        match self.run(request, &responder) {
            Ok(()) => responder.empty(),
            Err(halt) => halt.into_response(),
        }
    }

    fn responder_for(&self, request: &InboundRequest) -> Responder {
        let requested = request
            .param_str(&self.response.jsonp_handler)
            .filter(|callback| !callback.is_empty());

        let response_type = if requested.is_some() {
            ResponseType::Jsonp
        } else {
            self.response.default_type
        };

        let callback = requested
            .filter(|callback| is_valid_jsonp_callback(callback))
            .unwrap_or(self.response.default_jsonp_callback.as_str());

        Responder::new(response_type, callback, Arc::clone(&self.clock))
    }

    fn run(&self, request: InboundRequest, responder: &Responder) -> Flow {
        let path = request.path();
        let action_name = request.action_name();

        let Some(action) = self.actions.get(&path) else {
            warn!(path = %path, "Unknown action");
            return Err(responder.error_with_code("Action not found", None, 404));
        };

        let params = self.input_filter.apply_map(&request.params);
        let request = InboundRequest { params, ..request };
        let token = request.token().unwrap_or_default();

        let mut auth = self.auth.session();
        auth.set_request_uri(&path);

        if !auth.matches(&self.access.no_need_login, None) {
            auth.init(&token);
            if !auth.is_login() {
                warn!(path = %path, code = 401, "Rejected: not logged in");
                return Err(responder.error_with_code("Please login first", None, 401));
            }

            if !auth.matches(&self.access.no_need_right, None) && !auth.check(&path) {
                warn!(
                    path = %path,
                    code = 403,
                    user = auth.identity().unwrap_or("-"),
                    "Rejected: no permission"
                );
                return Err(responder.error_with_code("You have no permission", None, 403));
            }

            if self.check_parameters {
                if let GateOutcome::Rejected(rejection) = self.gate.evaluate(&request.params) {
                    warn!(
                        path = %path,
                        code = rejection.code(),
                        reason = %rejection,
                        "Rejected by request gate"
                    );
                    return Err(responder.error_with_code(
                        rejection.message(),
                        None,
                        rejection.code(),
                    ));
                }
                debug!(path = %path, "Request gate passed");
            }
        } else if !token.is_empty() {
            auth.init(&token);
        }

        let ctx = ActionContext {
            request: &request,
            path: &path,
            action: &action_name,
            auth: auth.as_ref(),
            responder,
        };

        self.hooks.dispatch(&ctx)?;
        action.execute(&ctx)
    }
}

/// Builder for [`ApiController`].
pub struct ApiControllerBuilder {
    auth: Arc<dyn AuthProvider>,
    gate: RequestGate,
    clock: Arc<dyn Clock>,
    check_parameters: bool,
    access: AccessRules,
    input_filter: InputFilter,
    response: ResponseSettings,
    actions: Vec<Arc<dyn Action>>,
    hooks: HookRegistry,
    hook_specs: Vec<HookSpec>,
}

impl ApiControllerBuilder {
    /// Whether logged-in actions go through the request gate.
    pub fn check_parameters(mut self, enabled: bool) -> Self {
        self.check_parameters = enabled;
        self
    }

    pub fn access(mut self, access: AccessRules) -> Self {
        self.access = access;
        self
    }

    pub fn input_filter(mut self, filter: InputFilter) -> Self {
        self.input_filter = filter;
        self
    }

    pub fn response(mut self, response: ResponseSettings) -> Self {
        self.response = response;
        self
    }

    pub fn action(mut self, action: Arc<dyn Action>) -> Self {
        self.actions.push(action);
        self
    }

    /// Make a hook available under `name`.
    pub fn hook(mut self, name: impl Into<String>, hook: Arc<dyn Hook>) -> Self {
        self.hooks.insert(name.into(), hook);
        self
    }

    /// Run a named hook before actions, in the order added.
    pub fn before_action(mut self, spec: HookSpec) -> Self {
        self.hook_specs.push(spec);
        self
    }

    pub fn build(self) -> GatewayResult<ApiController> {
        let mut actions = ActionRegistry::new();
        for action in self.actions {
            actions.register(action)?;
        }

        let hooks = HookDispatcher::bind(&self.hook_specs, &self.hooks)?;

        info!(
            actions = actions.len(),
            hooks = hooks.len(),
            check_parameters = self.check_parameters,
            "Controller initialized"
        );

        Ok(ApiController {
            auth: self.auth,
            gate: self.gate,
            check_parameters: self.check_parameters,
            access: self.access,
            hooks,
            actions,
            input_filter: self.input_filter,
            response: self.response,
            clock: self.clock,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenGrant;
    use crate::controller::{EchoAction, PingAction};
    use crate::guard::{ManualClock, MemoryReplayStore};
    use crate::hooks::hook_fn;
    use crate::protocol::Envelope;
    use serde_json::{json, Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const NOW: u64 = 1_700_000_000;

    struct Fixture {
        clock: Arc<ManualClock>,
        controller: ApiController,
    }

    struct SilentAction;

    impl Action for SilentAction {
        fn path(&self) -> &'static str {
            "index/silent"
        }

        fn execute(&self, _ctx: &ActionContext<'_>) -> Flow {
            Ok(())
        }
    }

    fn fixture_with(
        configure: impl FnOnce(ApiControllerBuilder) -> ApiControllerBuilder,
    ) -> Fixture {
        let clock = Arc::new(ManualClock::new(NOW));
        let replay = Arc::new(MemoryReplayStore::new(clock.clone()));
        let gate = RequestGate::new(SignatureVerifier::md5(), replay, clock.clone());
        let auth = Arc::new(TokenAuth::new([
            TokenGrant {
                token: "tok-admin".to_string(),
                user_id: "1".to_string(),
                rules: vec!["*".to_string()],
            },
            TokenGrant {
                token: "tok-reader".to_string(),
                user_id: "2".to_string(),
                rules: vec!["article/*".to_string()],
            },
        ]));

        let builder = ApiController::builder(auth, gate, clock.clone())
            .access(AccessRules {
                no_need_login: vec!["ping".to_string()],
                no_need_right: Vec::new(),
            })
            .action(Arc::new(PingAction))
            .action(Arc::new(EchoAction::new("signature")))
            .action(Arc::new(SilentAction));

        Fixture {
            clock,
            controller: configure(builder).build().unwrap(),
        }
    }

    fn fixture() -> Fixture {
        fixture_with(|builder| builder)
    }

    /// Sign `params` the way a client does, over already-filtered values.
    fn signed(controller: &ApiController, mut params: Map<String, Value>) -> Map<String, Value> {
        let payload = controller
            .gate
            .canonicalizer()
            .canonicalize(&params)
            .unwrap();
        let signature = controller.gate.verifier().sign(&payload);
        params.insert("signature".to_string(), Value::String(signature));
        params
    }

    fn base_params(token: &str, nonce: &str) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("timestamp".to_string(), json!(NOW.to_string()));
        params.insert("token".to_string(), json!(token));
        params.insert("nonce".to_string(), json!(nonce));
        params.insert("title".to_string(), json!("hello/world"));
        params
    }

    fn echo(params: Map<String, Value>) -> InboundRequest {
        InboundRequest::new("index", "echo").with_params(params)
    }

    fn envelope(response: &Response) -> Envelope {
        response.envelope().expect("json envelope")
    }

    #[test]
    fn test_unknown_action_is_404() {
        let fx = fixture();
        let response = fx.controller.handle(InboundRequest::new("index", "nope"));
        assert_eq!(response.status, 404);
        assert_eq!(envelope(&response).code, 404);
    }

    #[test]
    fn test_public_action_needs_no_token() {
        let fx = fixture();
        let response = fx.controller.handle(InboundRequest::new("Index", "Ping"));
        let env = envelope(&response);
        assert_eq!(response.status, 200);
        assert_eq!(env.code, 1);
        assert_eq!(env.msg, "pong");
        assert_eq!(env.time, NOW);
    }

    #[test]
    fn test_missing_token_is_401() {
        let fx = fixture();
        let response = fx.controller.handle(InboundRequest::new("index", "echo"));
        let env = envelope(&response);
        assert_eq!(env.code, 401);
        assert_eq!(env.msg, "Please login first");
        assert_eq!(response.status, 401);
    }

    #[test]
    fn test_missing_permission_is_403() {
        let fx = fixture();
        let params = signed(&fx.controller, base_params("tok-reader", "n1"));
        let response = fx.controller.handle(echo(params));
        assert_eq!(envelope(&response).code, 403);
        assert_eq!(envelope(&response).msg, "You have no permission");
    }

    #[test]
    fn test_valid_signed_request_reaches_action() {
        let fx = fixture();
        let params = signed(&fx.controller, base_params("tok-admin", "n1"));
        let response = fx.controller.handle(echo(params));
        let env = envelope(&response);

        assert_eq!(env.code, 1, "{}", response.body);
        assert_eq!(env.data["user_id"], "1");
        assert_eq!(env.data["params"]["title"], "hello/world");
        assert!(env.data["params"].get("signature").is_none());
    }

    #[test]
    fn test_gate_rejections_use_their_codes() {
        let fx = fixture();

        let mut missing = base_params("tok-admin", "n1");
        missing.remove("nonce");
        let response = fx.controller.handle(echo(signed(&fx.controller, missing)));
        assert_eq!(envelope(&response).code, 503);
        assert_eq!(response.status, 503);

        let mut tampered = signed(&fx.controller, base_params("tok-admin", "n2"));
        tampered.insert("title".to_string(), json!("changed"));
        let response = fx.controller.handle(echo(tampered));
        assert_eq!(envelope(&response).code, 504);
        assert_eq!(envelope(&response).msg, "Parameter tampering detected");

        let mut stale = base_params("tok-admin", "n3");
        stale.insert("timestamp".to_string(), json!((NOW - 501).to_string()));
        let response = fx.controller.handle(echo(signed(&fx.controller, stale)));
        assert_eq!(envelope(&response).code, 505);
    }

    #[test]
    fn test_replay_is_555_until_window_passes() {
        let fx = fixture();
        let params = signed(&fx.controller, base_params("tok-admin", "n1"));

        let first = fx.controller.handle(echo(params.clone()));
        assert_eq!(envelope(&first).code, 1);

        let second = fx.controller.handle(echo(params.clone()));
        assert_eq!(envelope(&second).code, 555);
        assert_eq!(envelope(&second).msg, "Duplicate submission");

        // The original timestamp is now exactly at the edge of the window.
        fx.clock.advance(500);
        let third = fx.controller.handle(echo(params));
        assert_eq!(envelope(&third).code, 1);
    }

    #[test]
    fn test_token_header_wins() {
        let fx = fixture();
        let params = signed(&fx.controller, base_params("tok-reader", "n1"));
        let request = echo(params).with_header("Token", "tok-admin");
        let response = fx.controller.handle(request);
        assert_eq!(envelope(&response).data["user_id"], "1");
    }

    #[test]
    fn test_inputs_are_filtered_before_signing() {
        let fx = fixture();
        let mut params = base_params("tok-admin", "n1");
        params.insert("title".to_string(), json!("hi"));
        let mut params = signed(&fx.controller, params);
        params.insert("title".to_string(), json!("  <b>hi</b> "));

        let response = fx.controller.handle(echo(params));
        let env = envelope(&response);
        assert_eq!(env.code, 1, "{}", response.body);
        assert_eq!(env.data["params"]["title"], "hi");
    }

    #[test]
    fn test_gate_can_be_disabled() {
        let fx = fixture_with(|builder| builder.check_parameters(false));
        let request = InboundRequest::new("index", "echo").with_param("token", "tok-admin");
        let response = fx.controller.handle(request);
        assert_eq!(envelope(&response).code, 1);
    }

    #[test]
    fn test_hooks_run_after_gate_and_can_halt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let fx = fixture_with(move |builder| {
            builder
                .hook(
                    "guard_echo",
                    hook_fn(move |ctx| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err(ctx.responder.error("blocked", None))
                    }),
                )
                .before_action(HookSpec::only("guard_echo", "echo"))
        });

        let ping = fx.controller.handle(InboundRequest::new("index", "ping"));
        assert_eq!(envelope(&ping).code, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let unsigned = fx.controller.handle(echo(base_params("tok-admin", "n1")));
        assert_eq!(envelope(&unsigned).code, 503);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let params = signed(&fx.controller, base_params("tok-admin", "n2"));
        let blocked = fx.controller.handle(echo(params));
        assert_eq!(envelope(&blocked).code, 0);
        assert_eq!(envelope(&blocked).msg, "blocked");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_hook_fails_build() {
        let clock = Arc::new(ManualClock::new(NOW));
        let replay = Arc::new(MemoryReplayStore::new(clock.clone()));
        let gate = RequestGate::new(SignatureVerifier::md5(), replay, clock.clone());
        let result = ApiController::builder(Arc::new(TokenAuth::default()), gate, clock)
            .before_action(HookSpec::always("nope"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_silent_action_gives_empty_200() {
        let fx = fixture_with(|builder| {
            builder.access(AccessRules {
                no_need_login: vec!["*".to_string()],
                no_need_right: Vec::new(),
            })
        });
        let response = fx.controller.handle(InboundRequest::new("index", "silent"));
        assert_eq!(response.status, 200);
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_jsonp_negotiation() {
        let fx = fixture();

        let response = fx
            .controller
            .handle(InboundRequest::new("index", "ping").with_param("callback", "cb_1"));
        assert!(response.content_type.starts_with("application/javascript"));
        assert!(response.body.starts_with("cb_1({"));
        assert!(response.body.ends_with(");"));

        let response = fx.controller.handle(
            InboundRequest::new("index", "ping").with_param("callback", "alert(1)"),
        );
        assert!(response.body.starts_with("jsonpReturn({"));
    }

    #[test]
    fn test_xml_default_type() {
        let fx = fixture_with(|builder| {
            builder.response(ResponseSettings {
                default_type: ResponseType::Xml,
                ..ResponseSettings::default()
            })
        });
        let response = fx.controller.handle(InboundRequest::new("index", "ping"));
        assert!(response.content_type.starts_with("text/xml"));
        assert!(response.body.contains("<think>"));
        assert!(response.body.contains("<msg>pong</msg>"));
    }

    #[test]
    fn test_from_settings_wires_builtins() {
        let mut settings = Settings::with_socket_path("/tmp/unused.sock");
        settings.access.no_need_login = vec!["ping".to_string()];
        settings.hooks = vec![HookSpec::always("log_action")];

        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(NOW));
        let replay = Arc::new(MemoryReplayStore::new(Arc::clone(&clock)));
        let controller = ApiController::from_settings(&settings, replay, clock).unwrap();

        assert_eq!(controller.actions().list(), vec!["index/echo", "index/ping"]);
        let response = controller.handle(InboundRequest::new("index", "ping"));
        assert_eq!(envelope(&response).code, 1);
    }
}
