//! Binding decoded requests to registered methods.
//!
//! The dispatcher is transport-free: bytes in, [`WireResponse`] out, with
//! the codec supplying both directions. Every failure mode maps to one of
//! the four standardized fault codes:
//!
//! - `-32700` the body did not decode
//! - `-32601` no such method
//! - `-32602` wrong argument count or argument kinds
//! - `-32603` the handler failed or panicked, or its result did not encode
//!
//! Handler panics are contained here; they never cross the transport
//! boundary as anything but a fault.

use crate::registry::Registry;
use std::panic::{catch_unwind, AssertUnwindSafe};
use xmlrpc_common::{Codec, Fault, Value, WireResponse};

/// Dispatches decoded requests against a registry.
pub struct Dispatcher {
    registry: Registry,
}

impl Dispatcher {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Handle one request body end to end: decode, look up, check, invoke,
    /// encode. Never fails; every error becomes a codec-rendered reply.
    pub fn dispatch(&self, codec: &dyn Codec, body: &[u8]) -> WireResponse {
        let doc = match codec.decode_request(body) {
            Ok(doc) => doc,
            Err(err) => {
                tracing::debug!(error = %err, "request body failed to decode");
                return codec.write_error(&Fault::not_well_formed(err));
            }
        };

        // Pathological but possible: a client POSTed a fault body. Echo it.
        if let Some(fault) = doc.fault {
            return codec.write_error(&fault);
        }

        let method_name = doc.method_name;
        let args = flatten_params(doc.params);

        let method = match self.registry.lookup(&method_name) {
            Some(method) => method,
            None => {
                tracing::debug!(method = %method_name, "unknown method");
                return codec.write_error(&Fault::unknown_method(&method_name));
            }
        };

        if args.len() != method.params().len() {
            return codec.write_error(&Fault::invalid_params(format!(
                "Bad number of parameters for method {:?} ({} != {})",
                method_name,
                args.len(),
                method.params().len()
            )));
        }

        let mut bound = Vec::with_capacity(args.len());
        for (i, (arg, want)) in args.into_iter().zip(method.params()).enumerate() {
            if arg.kind() == *want {
                bound.push(arg);
            } else if let Some(coerced) = codec.coerce_arg(&arg, *want) {
                bound.push(coerced);
            } else {
                return codec.write_error(&Fault::invalid_params(format!(
                    "Bad {method_name} argument #{i} ({} should be {want})",
                    arg.kind()
                )));
            }
        }

        let returns = match catch_unwind(AssertUnwindSafe(|| method.call(&bound))) {
            Ok(Ok(returns)) => returns,
            Ok(Err(fault)) => {
                tracing::debug!(method = %method_name, fault = %fault, "handler returned a fault");
                return codec.write_error(&fault);
            }
            Err(panic) => {
                tracing::error!(method = %method_name, "handler panicked");
                return codec.write_error(&Fault::internal(format!(
                    "method {:?} panicked: {}",
                    method_name,
                    panic_message(panic.as_ref())
                )));
            }
        };

        match codec.encode_response(&returns) {
            Ok(body) => WireResponse {
                status: 200,
                content_type: codec.content_type(),
                body,
            },
            Err(err) => codec.write_error(&Fault::internal(format!(
                "Failed to marshal {method_name}: {err}"
            ))),
        }
    }
}

/// The decoded parameter value becomes the argument list: an array supplies
/// the arguments, nil (an empty `<params>`) supplies none, and any other
/// value is the single argument.
fn flatten_params(params: Value) -> Vec<Value> {
    match params {
        Value::Nil => Vec::new(),
        Value::Array(items) => items,
        single => vec![single],
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Method, Service};
    use std::sync::Arc;
    use xmlrpc_common::{
        unmarshal_str, Kind, Reply, XmlRpcCodec, FAULT_INTERNAL, FAULT_INVALID_PARAMS,
        FAULT_NOT_WELL_FORMED, FAULT_UNKNOWN_METHOD,
    };

    struct Runset;

    impl Service for Runset {
        fn methods(self: Arc<Self>) -> Vec<Method> {
            vec![
                Method::new("rpc_ping", [], [Kind::Int], |_| Ok(vec![Value::Int(12345)])),
                Method::new(
                    "rpc_runset_events",
                    [Kind::Int, Kind::Int],
                    [Kind::Int, Kind::Bool],
                    |_| Ok(vec![Value::Int(17), Value::Bool(false)]),
                ),
                Method::new("rpc_fail", [], [], |_| {
                    Err(Fault::new(7, "nope"))
                }),
                Method::new("rpc_explode", [], [], |_| panic!("boom")),
            ]
        }
    }

    fn dispatcher() -> Dispatcher {
        let mut registry = Registry::new();
        registry.register(Arc::new(Runset));
        Dispatcher::new(registry)
    }

    fn call_xml(dispatcher: &Dispatcher, body: &str) -> Reply {
        let codec = XmlRpcCodec::new();
        let wire = dispatcher.dispatch(&codec, body.as_bytes());
        assert_eq!(wire.status, 200);
        codec
            .decode_response(&wire.body)
            .expect("reply must decode")
    }

    fn request(method: &str, params: &str) -> String {
        format!(
            "<?xml version=\"1.0\"?><methodCall><methodName>{method}</methodName>\
             <params>{params}</params></methodCall>"
        )
    }

    fn fault_of(reply: Reply) -> Fault {
        match reply {
            Reply::Fault(fault) => fault,
            Reply::Value(value) => panic!("expected fault, got {value:?}"),
        }
    }

    #[test]
    fn test_dispatch_zero_arg_method() {
        let reply = call_xml(&dispatcher(), &request("rpc_ping", ""));
        assert_eq!(reply, Reply::Value(Value::Int(12345)));
    }

    #[test]
    fn test_dispatch_two_arg_method_returns_pair() {
        let reply = call_xml(
            &dispatcher(),
            &request(
                "rpc_runset_events",
                "<param><value><int>123</int></value></param>\
                 <param><value><int>4</int></value></param>",
            ),
        );
        assert_eq!(
            reply,
            Reply::Value(Value::Array(vec![Value::Int(17), Value::Bool(false)]))
        );
    }

    #[test]
    fn test_unknown_method_fault() {
        let fault = fault_of(call_xml(&dispatcher(), &request("nope", "")));
        assert_eq!(fault.code, FAULT_UNKNOWN_METHOD);
        assert!(fault.message.contains("Unknown method"));
        assert!(fault.message.contains("nope"));
    }

    #[test]
    fn test_case_insensitive_dispatch() {
        let reply = call_xml(&dispatcher(), &request("RPC_PING", ""));
        assert_eq!(reply, Reply::Value(Value::Int(12345)));
    }

    #[test]
    fn test_arity_mismatch_fault() {
        let fault = fault_of(call_xml(
            &dispatcher(),
            &request("rpc_ping", "<param><value><int>1</int></value></param>"),
        ));
        assert_eq!(fault.code, FAULT_INVALID_PARAMS);
        assert!(fault.message.contains("(1 != 0)"));
    }

    #[test]
    fn test_kind_mismatch_fault() {
        let fault = fault_of(call_xml(
            &dispatcher(),
            &request(
                "rpc_runset_events",
                "<param><value><int>123</int></value></param>\
                 <param><value><string>four</string></value></param>",
            ),
        ));
        assert_eq!(fault.code, FAULT_INVALID_PARAMS);
        assert!(fault.message.contains("argument #1"));
        assert!(fault.message.contains("should be int"));
    }

    #[test]
    fn test_malformed_body_fault() {
        let fault = fault_of(call_xml(&dispatcher(), "this is not xml"));
        assert_eq!(fault.code, FAULT_NOT_WELL_FORMED);
    }

    #[test]
    fn test_fault_body_is_echoed() {
        let body = "<?xml version=\"1.0\"?><methodResponse><fault><value><struct>\
                    <member><name>faultCode</name><value><int>7</int></value></member>\
                    <member><name>faultString</name><value>nope</value></member>\
                    </struct></value></fault></methodResponse>";
        let fault = fault_of(call_xml(&dispatcher(), body));
        assert_eq!(fault, Fault::new(7, "nope"));
    }

    #[test]
    fn test_handler_fault_is_returned() {
        let fault = fault_of(call_xml(&dispatcher(), &request("rpc_fail", "")));
        assert_eq!(fault, Fault::new(7, "nope"));
    }

    #[test]
    fn test_handler_panic_becomes_internal_fault() {
        let fault = fault_of(call_xml(&dispatcher(), &request("rpc_explode", "")));
        assert_eq!(fault.code, FAULT_INTERNAL);
        assert!(fault.message.contains("boom"));
    }

    #[test]
    fn test_json_codec_coerces_numbers() {
        use xmlrpc_common::JsonRpcCodec;

        let codec = JsonRpcCodec::new();
        let body = br#"{"method":"rpc_runset_events","params":[123.0,4],"id":1}"#;
        let wire = dispatcher().dispatch(&codec, body);
        assert_eq!(wire.status, 200);
        assert_eq!(
            codec.decode_response(&wire.body).unwrap(),
            Reply::Value(Value::Array(vec![Value::Int(17), Value::Bool(false)]))
        );
    }

    #[test]
    fn test_json_codec_errors_are_400() {
        use xmlrpc_common::JsonRpcCodec;

        let codec = JsonRpcCodec::new();
        let wire = dispatcher().dispatch(&codec, br#"{"method":"nope","params":[],"id":1}"#);
        assert_eq!(wire.status, 400);
    }

    #[test]
    fn test_single_value_param_is_one_argument() {
        // one <param> whose value is not an array still binds as one argument
        let mut registry = Registry::new();
        struct Echo;
        impl Service for Echo {
            fn methods(self: Arc<Self>) -> Vec<Method> {
                vec![Method::new("echo", [Kind::String], [Kind::String], |args| {
                    Ok(vec![args[0].clone()])
                })]
            }
        }
        registry.register(Arc::new(Echo));
        let dispatcher = Dispatcher::new(registry);

        let reply = call_xml(
            &dispatcher,
            &request("echo", "<param><value><string>hi</string></value></param>"),
        );
        assert_eq!(reply, Reply::Value(Value::String("hi".into())));
    }

    #[test]
    fn test_response_decodes_with_library_entry_point() {
        // the full wire body must itself parse as a response document
        let codec = XmlRpcCodec::new();
        let wire = dispatcher().dispatch(&codec, request("rpc_ping", "").as_bytes());
        let doc = unmarshal_str(std::str::from_utf8(&wire.body).unwrap()).unwrap();
        assert_eq!(doc.params, Value::Int(12345));
    }
}
