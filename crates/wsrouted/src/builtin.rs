//! Endpoints served by the `wsrouted` binary out of the box.
//!
//! | route           | parameters                  | result                        |
//! |-----------------|-----------------------------|-------------------------------|
//! | `echo`          | `value`                     | `value` unchanged             |
//! | `math.add`      | `a`, `b` (integers)         | `a + b`                       |
//! | `math.divide`   | `dividend`, `divisor`       | quotient; fails on zero       |
//! | `session.info`  | none                        | caller identity and counters  |
//! | `session.close` | none                        | `true`, then the server closes|
//! | `clock.delay`   | `ms` (default 100)          | completes after the delay     |

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::endpoint::{
    Arguments, CallContext, Component, ComponentSpec, Deferred, EndpointError, EndpointRegistry,
    Injected, ParamKind, ParamSpec, RegistryError, Reply,
};
use crate::services::{ServiceContainer, ServiceParam};
use crate::session::{ConnectionContext, SessionRegistry};

/// Upper bound for `clock.delay`.
pub const MAX_DELAY_MS: u64 = 10_000;

const DEFAULT_DELAY_MS: u64 = 100;

#[derive(Debug, Default)]
struct Echo;

impl Component for Echo {}

#[derive(Debug, Default)]
struct Math;

impl Component for Math {}

#[derive(Debug, Default)]
struct Clock;

impl Component for Clock {}

/// Reports on and controls the calling session. Receives its connection
/// through the context slot and the session registry as a constructor
/// service.
struct Sessions {
    sessions: Option<Arc<SessionRegistry>>,
    connection: Option<ConnectionContext>,
}

impl Component for Sessions {
    fn inject(&mut self, slot: &str, value: Injected<'_>) -> bool {
        match value {
            Injected::Context(context) if slot == wsroute_config::DEFAULT_CONTEXT_SLOT => {
                self.connection = Some(context.clone());
                true
            }
            Injected::Context(_) | Injected::Transport(_) => false,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionSummary {
    id: String,
    remote: Option<String>,
    path: String,
    uptime_ms: u64,
    live_sessions: Option<usize>,
}

/// Builds the registry of built-in endpoints.
///
/// # Errors
///
/// Returns [`RegistryError`] if two built-in routes collide.
pub fn builtin_endpoints() -> Result<EndpointRegistry, RegistryError> {
    let builder = EndpointRegistry::builder()
        .component(ComponentSpec::<Echo>::default_constructed())?
        .component(ComponentSpec::<Math>::default_constructed())?
        .component(ComponentSpec::<Clock>::default_constructed())?
        .component(
            ComponentSpec::new(|args| {
                Ok(Sessions {
                    sessions: args.get::<SessionRegistry>("sessions"),
                    connection: None,
                })
            })
            .with_service(ServiceParam::of::<SessionRegistry>("sessions")),
        )?
        .endpoint("echo", vec![ParamSpec::new("value", ParamKind::Any)], echo)?
        .endpoint(
            "math.add",
            vec![
                ParamSpec::new("a", ParamKind::Integer),
                ParamSpec::new("b", ParamKind::Integer),
            ],
            add,
        )?
        .endpoint(
            "math.divide",
            vec![
                ParamSpec::new("dividend", ParamKind::Float),
                ParamSpec::new("divisor", ParamKind::Float),
            ],
            divide,
        )?
        .endpoint("session.info", Vec::new(), session_info)?
        .endpoint("session.close", Vec::new(), session_close)?
        .endpoint(
            "clock.delay",
            vec![ParamSpec::new("ms", ParamKind::Unsigned).with_default(DEFAULT_DELAY_MS)],
            delay,
        )?;
    Ok(builder.build())
}

/// Services the built-in endpoints depend on.
#[must_use]
pub fn builtin_services(sessions: Arc<SessionRegistry>) -> ServiceContainer {
    ServiceContainer::new().shared(sessions)
}

fn echo(_: &mut Echo, _: &CallContext<'_>, args: &Arguments) -> Result<Reply, EndpointError> {
    Ok(Reply::from(args.value("value").cloned().unwrap_or(Value::Null)))
}

fn add(_: &mut Math, _: &CallContext<'_>, args: &Arguments) -> Result<Reply, EndpointError> {
    let a = args.required::<i64>("a")?;
    let b = args.required::<i64>("b")?;
    let sum = a
        .checked_add(b)
        .ok_or_else(|| EndpointError::failed(format!("{a} + {b} overflows")))?;
    Ok(Reply::from(Value::from(sum)))
}

fn divide(_: &mut Math, _: &CallContext<'_>, args: &Arguments) -> Result<Reply, EndpointError> {
    let dividend = args.required::<f64>("dividend")?;
    let divisor = args.required::<f64>("divisor")?;
    if divisor == 0.0 {
        return Err(EndpointError::failed("division by zero"));
    }
    Reply::json(&(dividend / divisor))
}

fn session_info(
    info: &mut Sessions,
    call: &CallContext<'_>,
    _: &Arguments,
) -> Result<Reply, EndpointError> {
    let connection = info.connection.as_ref().unwrap_or(call.connection());
    let summary = SessionSummary {
        id: connection.id().to_string(),
        remote: connection.remote().map(|remote| remote.to_string()),
        path: connection.path().to_owned(),
        uptime_ms: u64::try_from(call.session().uptime().as_millis()).unwrap_or(u64::MAX),
        live_sessions: info.sessions.as_ref().map(|sessions| sessions.len()),
    };
    Reply::json(&summary)
}

fn session_close(
    _: &mut Sessions,
    call: &CallContext<'_>,
    _: &Arguments,
) -> Result<Reply, EndpointError> {
    call.session().request_close();
    Ok(Reply::from(Value::Bool(true)))
}

fn delay(_: &mut Clock, _: &CallContext<'_>, args: &Arguments) -> Result<Reply, EndpointError> {
    let requested = args.typed::<u64>("ms")?.unwrap_or(DEFAULT_DELAY_MS);
    let ms = requested.min(MAX_DELAY_MS);
    Ok(Reply::from(Deferred::spawn(move || {
        thread::sleep(Duration::from_millis(ms));
        Ok(serde_json::json!({ "sleptMs": ms }))
    })))
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;
    use crate::dispatch::{DispatchSettings, Dispatcher, Request, Status};
    use crate::session::{ConnectionId, SessionHandle};

    #[fixture]
    fn sessions() -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new())
    }

    fn dispatcher(sessions: &Arc<SessionRegistry>) -> Dispatcher {
        Dispatcher::new(
            Arc::new(builtin_endpoints().expect("builtin endpoints")),
            Some(Arc::new(builtin_services(Arc::clone(sessions)))),
            DispatchSettings {
                development: true,
                ..DispatchSettings::default()
            },
        )
    }

    fn call(
        sessions: &Arc<SessionRegistry>,
        target: &str,
        body: Value,
    ) -> (Status, Value, SessionHandle) {
        let mut connection = ConnectionContext::new(
            ConnectionId::new("conn-builtin"),
            Some("10.0.0.7:5000".parse().expect("socket addr")),
        );
        connection.set_path("/ws");
        let handle = SessionHandle::new(&connection);
        sessions.try_register(&handle);
        let request = Request {
            id: json!(1),
            target: target.to_owned(),
            body: body.as_object().cloned(),
        };
        let response = dispatcher(sessions).distribute(&connection, &handle, &request);
        (response.status, response.body, handle)
    }

    #[rstest]
    #[case("echo", json!({"value": "hi"}), json!("hi"))]
    #[case("echo", json!({"value": {"nested": [1, 2]}}), json!({"nested": [1, 2]}))]
    #[case("math.add", json!({"a": 40, "b": "2"}), json!(42))]
    #[case("math.add", json!({"a": 1}), json!(1))]
    #[case("math.add", json!({"a": 1, "b": "two"}), json!(1))]
    #[case("Math.Divide", json!({"dividend": 9, "divisor": 2}), json!(4.5))]
    #[case("clock.delay", json!({"ms": 1}), json!({"sleptMs": 1}))]
    fn builtin_routes_answer(
        sessions: Arc<SessionRegistry>,
        #[case] target: &str,
        #[case] body: Value,
        #[case] expected: Value,
    ) {
        let (status, result, _) = call(&sessions, target, body);
        assert_eq!(status, Status::Success);
        assert_eq!(result, expected);
    }

    #[rstest]
    #[case("math.divide", json!({"dividend": 1, "divisor": 0}))]
    #[case("math.add", json!({"a": i64::MAX, "b": 1}))]
    #[case("math.divide", json!({"dividend": 1}))]
    fn invalid_arithmetic_fails(
        sessions: Arc<SessionRegistry>,
        #[case] target: &str,
        #[case] body: Value,
    ) {
        let (status, _, _) = call(&sessions, target, body);
        assert_eq!(status, Status::Failure);
    }

    #[rstest]
    fn session_info_reports_the_caller(sessions: Arc<SessionRegistry>) {
        let (status, body, _) = call(&sessions, "session.info", Value::Null);
        assert_eq!(status, Status::Success);
        assert_eq!(body["id"], json!("conn-builtin"));
        assert_eq!(body["remote"], json!("10.0.0.7:5000"));
        assert_eq!(body["path"], json!("/ws"));
        assert_eq!(body["liveSessions"], json!(1));
    }

    #[rstest]
    fn session_close_requests_a_close(sessions: Arc<SessionRegistry>) {
        let (status, body, handle) = call(&sessions, "session.close", Value::Null);
        assert_eq!(status, Status::Success);
        assert_eq!(body, json!(true));
        assert!(handle.is_closing());
    }

    #[test]
    fn routes_are_listed() {
        let registry = builtin_endpoints().expect("builtin endpoints");
        assert_eq!(
            registry.routes(),
            vec![
                "clock.delay",
                "echo",
                "math.add",
                "math.divide",
                "session.close",
                "session.info"
            ]
        );
    }
}
