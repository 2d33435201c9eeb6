//! Rholang term construction and node expression decoding.

use serde_json::{Map, Value};

use crate::invoke::{InvokeError, InvokeRequest, ReturnChannel, RhoArg, is_uri_literal};

/// Build the deploy term that carries a call to its module.
///
/// The term looks the module up in the on-chain registry and sends it the
/// method name, the positional arguments and the return channel. With a
/// reserved return channel, `return` is the first name the deploy creates,
/// so it is the unforgeable name previewed for that deploy.
///
/// # Errors
///
/// [`InvokeError::InvalidArgument`] if the module address or a URI argument
/// cannot be quoted as a Rholang URI.
pub fn invoke_term(request: &InvokeRequest) -> Result<String, InvokeError> {
    if !is_uri_literal(request.address.as_str()) {
        return Err(InvokeError::invalid_argument(format!(
            "module address {:?} is not a URI",
            request.address.as_str()
        )));
    }
    if let Some(uri) = request.args.iter().find_map(RhoArg::invalid_uri) {
        return Err(InvokeError::invalid_argument(format!(
            "{uri:?} is not a URI"
        )));
    }

    let binder = match request.return_channel {
        ReturnChannel::DeployId => "return(`rho:rchain:deployId`)",
        ReturnChannel::Reserved(_) => "return",
    };

    let mut call_args: Vec<String> = Vec::with_capacity(request.args.len() + 2);
    call_args.push(format!("\"{}\"", request.method.name()));
    call_args.extend(request.args.iter().map(RhoArg::to_rholang));
    call_args.push("*return".to_owned());

    Ok(format!(
        "new {binder}, lookup(`rho:registry:lookup`), moduleCh in {{\n  \
         lookup!(`{address}`, *moduleCh) |\n  \
         for (module <- moduleCh) {{\n    \
         module!({args})\n  \
         }}\n}}",
        address = request.address,
        args = call_args.join(", "),
    ))
}

/// Convert a node expression (`{"ExprInt": {"data": 1}}` and friends) into
/// plain JSON. Byte arrays and unforgeable names become hex strings.
pub fn expr_to_json(expr: &Value) -> Result<Value, String> {
    let Some((tag, body)) = expr.as_object().and_then(single_entry) else {
        return Err(format!("not a tagged expression: {expr}"));
    };
    let data = body.get("data").unwrap_or(&Value::Null);

    match tag.as_str() {
        "ExprInt" | "ExprBool" | "ExprString" | "ExprUri" | "ExprBytes" => Ok(data.clone()),
        "ExprNil" => Ok(Value::Null),
        "ExprList" | "ExprTuple" | "ExprSet" | "ExprPar" => {
            let items = data
                .as_array()
                .ok_or_else(|| format!("{tag} without an array: {data}"))?;
            items.iter().map(expr_to_json).collect::<Result<Vec<_>, _>>().map(Value::Array)
        }
        "ExprMap" => {
            let entries = data
                .as_object()
                .ok_or_else(|| format!("ExprMap without an object: {data}"))?;
            let mut out = Map::with_capacity(entries.len());
            for (key, value) in entries {
                out.insert(key.clone(), expr_to_json(value)?);
            }
            Ok(Value::Object(out))
        }
        "ExprUnforg" => {
            let (_, inner) = data
                .as_object()
                .and_then(single_entry)
                .ok_or_else(|| format!("malformed unforgeable name: {data}"))?;
            Ok(inner.get("data").cloned().unwrap_or(Value::Null))
        }
        other => Err(format!("unsupported expression type {other}")),
    }
}

/// First datum of a `data-at-name` response, converted to plain JSON.
///
/// `Ok(None)` means nothing has been sent on the name yet.
pub fn first_datum(response: &Value) -> Result<Option<Value>, String> {
    let Some(exprs) = response.get("exprs").and_then(Value::as_array) else {
        return Err(format!("response without exprs: {response}"));
    };
    let Some(first) = exprs.first() else {
        return Ok(None);
    };
    let expr = first.get("expr").unwrap_or(first);
    expr_to_json(expr).map(Some)
}

fn single_entry(map: &Map<String, Value>) -> Option<(&String, &Value)> {
    if map.len() == 1 { map.iter().next() } else { None }
}
