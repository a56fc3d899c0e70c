//! Maps a request body onto an endpoint's declared parameters.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::endpoint::{Arguments, ParamKind, ParamSpec};
use crate::session::ConnectionContext;

use super::DISPATCH_TARGET;

/// Binds arguments for one call.
///
/// With no body (or an empty one) every parameter takes its declared default
/// or its kind's zero value. Otherwise each parameter is looked up by name;
/// absent keys and values that fail conversion fall back the same way, and
/// conversion failures are logged.
pub(crate) fn bind(
    params: &Arc<[ParamSpec]>,
    body: Option<&Map<String, Value>>,
    connection: &ConnectionContext,
    route: &str,
) -> Arguments {
    let values = match body.filter(|body| !body.is_empty()) {
        None => params.iter().map(ParamSpec::fallback).collect(),
        Some(body) => params
            .iter()
            .map(|param| bind_one(param, body, connection, route))
            .collect(),
    };
    Arguments::new(Arc::clone(params), values)
}

fn bind_one(
    param: &ParamSpec,
    body: &Map<String, Value>,
    connection: &ConnectionContext,
    route: &str,
) -> Value {
    if param.kind() == ParamKind::Payload {
        return Value::Object(body.clone());
    }
    let Some(raw) = body.get(param.name()) else {
        return param.fallback();
    };
    param.kind().convert(raw).unwrap_or_else(|error| {
        debug!(
            target: DISPATCH_TARGET,
            connection = %connection.id(),
            remote = %connection.peer(),
            route,
            param = param.name(),
            error = %error,
            "argument conversion failed; binding fallback"
        );
        param.fallback()
    })
}
