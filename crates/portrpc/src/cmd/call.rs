use std::time::Instant;

use portrpc_peer::{Request, RequestId};

use crate::cmd::host::{self, HostMode};
use crate::cmd::{parse_params, resolve_config, runtime, CallArgs};
use crate::exit::{rpc_error, CliResult, FAILURE, SUCCESS};
use crate::output::{has_error, print_response, OutputFormat};

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let config = resolve_config(&args.connect)?;
    let params = parse_params(args.params.as_deref())?;
    let request = Request::new(parse_id(&args.id), args.method, params);
    let mode = HostMode::from_args(&args.connect);

    let started = Instant::now();
    let response = runtime()?
        .block_on(host::exchange(&request, config, mode))
        .map_err(|err| rpc_error("call failed", err))?;
    print_response(&response, started.elapsed(), format);

    Ok(if has_error(&response) { FAILURE } else { SUCCESS })
}

fn parse_id(raw: &str) -> RequestId {
    if let Ok(id) = raw.parse::<i64>() {
        return RequestId::Number(id);
    }
    raw.parse::<u64>()
        .map(RequestId::Unsigned)
        .unwrap_or_else(|_| RequestId::from(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_stay_numbers() {
        assert_eq!(parse_id("42"), RequestId::Number(42));
        assert_eq!(parse_id("-1"), RequestId::Number(-1));
        assert_eq!(parse_id("a"), RequestId::from("a"));
        assert_eq!(parse_id("0x1"), RequestId::from("0x1"));
        assert_eq!(
            parse_id("18446744073709551615"),
            RequestId::Unsigned(u64::MAX)
        );
    }
}
