//! Listchase benchmarking client executable.

use std::net::SocketAddr;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use listchase::{
    logger_init, logger_set_me, pf_error, pf_info, pf_warn, ChaseError,
    QueryGenerator, TransportKind,
};
use log::{self, LevelFilter};
use tokio::runtime::Builder;
use tokio::time::Duration;

/// Command line arguments definition.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Lookup server address.
    #[arg(short = 'a', long)]
    server: SocketAddr,

    /// Number of lookups per pass.
    #[arg(short, long)]
    queries: usize,

    /// Number of elements in each server list.
    #[arg(short, long)]
    elements: usize,

    /// Size of each element's value in bytes.
    #[arg(short = 's', long)]
    value_size: usize,

    /// Run an untimed warm-up pass before the timed passes.
    #[arg(short, long, default_value_t = true, action = ArgAction::Set)]
    warmup: bool,

    /// Offload flag; accepted for compatibility, has no effect.
    #[arg(short, long, default_value_t = false, action = ArgAction::Set)]
    offload: bool,

    /// Transport to use: 'tcp' or 'udp'.
    #[arg(long, default_value_t = String::from("tcp"))]
    transport: String,

    /// Per-call deadline in millisecs.
    #[arg(long, default_value_t = 25000)]
    timeout_ms: u64,

    /// Query mode parameters TOML string, with '+' standing for newline.
    /// Example: --params 'repetitions=5+seed=42'.
    #[arg(long, default_value_t = String::from(""))]
    params: String,

    /// Number of tokio worker threads.
    #[arg(long, default_value_t = 2)]
    threads: usize,
}

impl CliArgs {
    /// Sanitize command line arguments, return `Ok(transport)` on success
    /// or `Err(ChaseError)` on any error.
    fn sanitize(&self) -> Result<TransportKind, ChaseError> {
        if self.queries == 0 {
            Err(ChaseError::msg(format!(
                "invalid number of queries {}",
                self.queries
            )))
        } else if self.elements == 0 {
            Err(ChaseError::msg(format!(
                "invalid number of elements {}",
                self.elements
            )))
        } else if self.value_size == 0 {
            Err(ChaseError::msg(format!(
                "invalid value size {}",
                self.value_size
            )))
        } else if self.timeout_ms == 0 {
            Err(ChaseError::msg(format!(
                "invalid timeout {} ms",
                self.timeout_ms
            )))
        } else if self.threads == 0 {
            Err(ChaseError::msg(format!(
                "invalid number of threads {}",
                self.threads
            )))
        } else {
            TransportKind::parse_name(&self.transport).ok_or(ChaseError::msg(
                format!("transport name '{}' unrecognized", self.transport),
            ))
        }
    }

    /// Params string with '+' turned into newlines; `None` if empty.
    fn params_str(&self) -> Option<String> {
        if self.params.is_empty() {
            None
        } else {
            Some(self.params.replace('+', "\n"))
        }
    }
}

/// Actual main function of the benchmarking client.
fn client_main() -> Result<(), ChaseError> {
    // read in and parse command line arguments
    let args = CliArgs::parse();
    let transport = args.sanitize()?;
    if args.offload {
        pf_warn!("offload flag has no effect");
    }

    let params_str = args.params_str();
    let log_level = log::max_level();
    {
        // create tokio multi-threaded runtime
        let runtime = Builder::new_multi_thread()
            .enable_all()
            .worker_threads(args.threads)
            .thread_name("tokio-worker-client")
            .build()?;

        // enter tokio runtime, run the query passes, and print the report
        runtime.block_on(async move {
            pf_info!(
                "querying {} over {:?}: {} lookups x {} elements x {} B",
                args.server,
                transport,
                args.queries,
                args.elements,
                args.value_size
            );
            let mut generator = QueryGenerator::new(
                transport.new_endpoint(args.server),
                Duration::from_millis(args.timeout_ms),
                args.warmup,
                params_str.as_deref(),
            )?;

            let stats = generator
                .run(args.queries, args.elements as u64, args.value_size)
                .await?;
            stats.summarize()?.print(
                args.elements,
                args.queries,
                args.value_size,
            );

            // suppress logging before dropping the runtime to avoid spurious
            // error messages
            log::set_max_level(LevelFilter::Off);

            Ok::<(), ChaseError>(()) // give type hint for this async closure
        })?;
    } // drop the runtime here

    log::set_max_level(log_level);
    Ok(())
}

/// Main function of the benchmarking client.
fn main() -> ExitCode {
    logger_init();
    logger_set_me("c");

    if let Err(ref e) = client_main() {
        pf_error!("client_main exited: {}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[cfg(test)]
mod arg_tests {
    use super::*;

    fn valid_args() -> Result<CliArgs, ChaseError> {
        Ok(CliArgs {
            server: "127.0.0.1:52700".parse()?,
            queries: 1000,
            elements: 1024,
            value_size: 64,
            warmup: true,
            offload: false,
            transport: "tcp".into(),
            timeout_ms: 25000,
            params: String::new(),
            threads: 2,
        })
    }

    #[test]
    fn sanitize_valid() -> Result<(), ChaseError> {
        let mut args = valid_args()?;
        assert_eq!(args.sanitize(), Ok(TransportKind::Tcp));
        args.transport = "udp".into();
        assert_eq!(args.sanitize(), Ok(TransportKind::Udp));
        Ok(())
    }

    #[test]
    fn sanitize_invalid_counts() -> Result<(), ChaseError> {
        let mut args = valid_args()?;
        args.queries = 0;
        assert!(args.sanitize().is_err());
        let mut args = valid_args()?;
        args.elements = 0;
        assert!(args.sanitize().is_err());
        let mut args = valid_args()?;
        args.value_size = 0;
        assert!(args.sanitize().is_err());
        Ok(())
    }

    #[test]
    fn sanitize_invalid_timeout() -> Result<(), ChaseError> {
        let mut args = valid_args()?;
        args.timeout_ms = 0;
        assert!(args.sanitize().is_err());
        Ok(())
    }

    #[test]
    fn sanitize_invalid_transport() -> Result<(), ChaseError> {
        let mut args = valid_args()?;
        args.transport = "carrier-pigeon".into();
        assert!(args.sanitize().is_err());
        Ok(())
    }

    #[test]
    fn params_plus_as_newline() -> Result<(), ChaseError> {
        let mut args = valid_args()?;
        assert_eq!(args.params_str(), None);
        args.params = "repetitions=5+seed=42".into();
        assert_eq!(args.params_str(), Some("repetitions=5\nseed=42".into()));
        Ok(())
    }
}
