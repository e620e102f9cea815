use std::time::Instant;

use portrpc_peer::Request;

use crate::cmd::host::{self, HostMode};
use crate::cmd::{parse_params, resolve_config, runtime, BatchArgs};
use crate::exit::{rpc_error, CliResult, FAILURE, SUCCESS};
use crate::output::{has_error, print_response, OutputFormat};

pub fn run(args: BatchArgs, format: OutputFormat) -> CliResult<i32> {
    let config = resolve_config(&args.connect)?;
    let params = parse_params(args.params.as_deref())?;
    let batch = build_batch(&args.methods, &params);
    let mode = HostMode::from_args(&args.connect);

    let started = Instant::now();
    let response = runtime()?
        .block_on(host::exchange(&batch, config, mode))
        .map_err(|err| rpc_error("batch failed", err))?;
    print_response(&response, started.elapsed(), format);

    Ok(if has_error(&response) { FAILURE } else { SUCCESS })
}

/// One request per method, numbered from 1.
fn build_batch(methods: &[String], params: &serde_json::Value) -> Vec<Request> {
    (1_i64..)
        .zip(methods)
        .map(|(id, method)| Request::new(id, method.as_str(), params.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use portrpc_peer::RequestId;
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn batch_ids_follow_method_order() {
        let methods = vec!["eth_chainId".to_string(), "net_version".to_string()];
        let batch = build_batch(&methods, &Value::Null);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].id, RequestId::Number(1));
        assert_eq!(batch[1].id, RequestId::Number(2));
        assert_eq!(batch[1].method, "net_version");
    }

    #[test]
    fn params_are_shared() {
        let methods = vec!["a".to_string(), "b".to_string()];
        let batch = build_batch(&methods, &json!(["latest"]));
        assert!(batch.iter().all(|req| req.params == json!(["latest"])));
    }
}
