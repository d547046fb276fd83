use std::error::Error;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use swagger_conform::load::{is_remote, load_specification};
use swagger_conform::{
    format_outcome, run, to_json_line, ExecutionOutcome, HttpMethod, HttpTransport, MethodOrder,
    RunConfig, RunError, Summary,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn cli() -> Command {
    Command::new("swagger-conform")
        .about("Check a running API against its Swagger 2.0 document")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("spec")
                .value_name("SPEC")
                .required(true)
                .help("Path or http(s) URL of the swagger.json document"),
        )
        .arg(
            Arg::new("target")
                .long("target")
                .help("Base URL of the API under test (defaults to the document URL or scheme://host)"),
        )
        .arg(
            Arg::new("pacing")
                .long("pacing")
                .value_name("SECONDS")
                .value_parser(parse_pacing)
                .help("Delay after every request"),
        )
        .arg(
            Arg::new("no-examples")
                .long("no-examples")
                .action(ArgAction::SetTrue)
                .help("Ignore declared examples and synthesize every value"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Print the requests without sending them"),
        )
        .arg(
            Arg::new("header")
                .long("header")
                .short('H')
                .value_name("NAME:VALUE")
                .value_parser(parse_header)
                .action(ArgAction::Append)
                .help("Extra header for every request (repeatable)"),
        )
        .arg(
            Arg::new("method-order")
                .long("method-order")
                .value_name("METHODS")
                .value_parser(parse_method_order)
                .help("Comma-separated method order, e.g. post,put,get,delete"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Emit one JSON record per outcome"),
        )
}

fn parse_pacing(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|_| format!("`{s}` is not a number"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    match s.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected NAME:VALUE, got `{s}`")),
    }
}

fn parse_method_order(s: &str) -> Result<MethodOrder, String> {
    let methods = s
        .split(',')
        .filter(|m| !m.trim().is_empty())
        .map(|m| m.parse::<HttpMethod>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;
    if methods.is_empty() {
        return Err("at least one method is required".to_string());
    }
    Ok(MethodOrder::new(methods))
}

fn print_outcome(outcome: &ExecutionOutcome, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", to_json_line(outcome)?);
    } else {
        println!("{}", format_outcome(outcome));
    }
    Ok(())
}

fn execute(matches: &ArgMatches) -> Result<Summary, Box<dyn Error>> {
    let location = matches
        .get_one::<String>("spec")
        .ok_or("missing SPEC argument")?;
    let json = matches.get_flag("json");

    let transport = HttpTransport::with_timeout(REQUEST_TIMEOUT)?;
    let spec = load_specification(transport.client(), location)?;

    let target = match matches.get_one::<String>("target") {
        Some(target) => target.clone(),
        None if is_remote(location) => location.clone(),
        None => spec.default_base_url(),
    };

    let mut config = RunConfig::new(target)
        .use_examples(!matches.get_flag("no-examples"))
        .dry_run(matches.get_flag("dry-run"));
    if let Some(pacing) = matches.get_one::<Duration>("pacing") {
        config = config.pacing(*pacing);
    }
    if let Some(order) = matches.get_one::<MethodOrder>("method-order") {
        config = config.method_order(order.clone());
    }
    if let Some(headers) = matches.get_many::<(String, String)>("header") {
        for (name, value) in headers {
            config = config.extra_header(name.clone(), value.clone());
        }
    }

    let mut summary = Summary::default();
    for outcome in run(&spec, &config, &transport)? {
        match outcome {
            Ok(outcome) => {
                summary.record(&outcome);
                print_outcome(&outcome, json)?;
            }
            Err(err) => {
                if let RunError::RetryExhausted { outcome, .. } = &err {
                    summary.record(outcome);
                    print_outcome(outcome, json)?;
                    eprintln!("{summary}");
                }
                return Err(err.into());
            }
        }
    }
    Ok(summary)
}

fn report_error(err: &dyn Error) {
    eprintln!("error: {err}");
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
}

fn main() -> ExitCode {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let matches = cli().get_matches();
    match execute(&matches) {
        Ok(summary) => {
            eprintln!("{summary}");
            if summary.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            report_error(err.as_ref());
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn parses_all_flags() {
        let matches = cli()
            .try_get_matches_from([
                "swagger-conform",
                "swagger.json",
                "--target",
                "http://localhost:8080",
                "--pacing",
                "0.5",
                "--no-examples",
                "--dry-run",
                "-H",
                "Authorization: Bearer t",
                "--header",
                "X-Trace:1",
                "--method-order",
                "get,post",
                "--json",
            ])
            .unwrap();

        assert_eq!(matches.get_one::<String>("spec").unwrap(), "swagger.json");
        assert_eq!(
            matches.get_one::<Duration>("pacing"),
            Some(&Duration::from_millis(500))
        );
        assert!(matches.get_flag("no-examples"));
        assert!(matches.get_flag("dry-run"));
        assert!(matches.get_flag("json"));
        let headers: Vec<_> = matches
            .get_many::<(String, String)>("header")
            .unwrap()
            .cloned()
            .collect();
        assert_eq!(
            headers,
            [
                ("Authorization".to_string(), "Bearer t".to_string()),
                ("X-Trace".to_string(), "1".to_string()),
            ]
        );
        assert_eq!(
            matches.get_one::<MethodOrder>("method-order").unwrap().methods(),
            [HttpMethod::Get, HttpMethod::Post]
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(":value").is_err());
        assert!(parse_pacing("-1").is_err());
        assert!(parse_pacing("soon").is_err());
        assert!(parse_method_order("get,fetch").is_err());
        assert!(parse_method_order(",").is_err());
    }
}
