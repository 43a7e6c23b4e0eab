//! Listchase lookup server executable.

use std::net::{Ipv4Addr, SocketAddr};
use std::process::ExitCode;

use clap::Parser;
use listchase::{
    codec, logger_init, logger_set_me, pf_error, pf_info, ChaseError,
    LookupServer, NodeIdx, MAX_ARRAY_LEN,
};
use log::{self, LevelFilter};
use tokio::runtime::Builder;
use tokio::sync::watch;

/// Command line arguments definition.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Number of elements in each list.
    #[arg(short, long)]
    elements: usize,

    /// Size of each element's value in bytes.
    #[arg(short = 's', long)]
    value_size: usize,

    /// Local IP to use for binding the listening sockets.
    #[arg(short, long, default_value_t = Ipv4Addr::UNSPECIFIED)]
    bind_ip: Ipv4Addr,

    /// Client-facing API port, shared by TCP and UDP.
    /// This port must be available at process launch.
    #[arg(short, long, default_value_t = 52700)]
    port: u16,

    /// Number of tokio worker threads.
    #[arg(long, default_value_t = 4)]
    threads: usize,

    /// Server configuration TOML string, with '+' standing for newline.
    /// Example: --config 'num_replicas=1024+scatter="hop"'.
    #[arg(long, default_value_t = String::from(""))]
    config: String,
}

impl CliArgs {
    /// Sanitize command line arguments, return `Ok(())` on success or
    /// `Err(ChaseError)` on any error.
    fn sanitize(&self) -> Result<(), ChaseError> {
        if self.elements == 0 {
            Err(ChaseError::msg(format!(
                "invalid number of elements {}",
                self.elements
            )))
        } else if self.elements > NodeIdx::MAX as usize {
            Err(ChaseError::msg(format!(
                "number of elements {} not addressable",
                self.elements
            )))
        } else if self.value_size == 0 {
            Err(ChaseError::msg(format!(
                "invalid value size {}",
                self.value_size
            )))
        } else if codec::words_per_value(self.value_size) > MAX_ARRAY_LEN {
            Err(ChaseError::msg(format!(
                "value size {} exceeds {} words",
                self.value_size, MAX_ARRAY_LEN
            )))
        } else if self.port <= 1024 {
            Err(ChaseError::msg(format!("invalid port {}", self.port)))
        } else if self.threads < 2 {
            Err(ChaseError::msg(format!(
                "invalid number of threads {}",
                self.threads
            )))
        } else {
            Ok(())
        }
    }

    /// Config string with '+' turned into newlines; `None` if empty.
    fn config_str(&self) -> Option<String> {
        if self.config.is_empty() {
            None
        } else {
            Some(self.config.replace('+', "\n"))
        }
    }
}

/// Actual main function of the lookup server.
fn server_main() -> Result<(), ChaseError> {
    // read in and parse command line arguments
    let args = CliArgs::parse();
    args.sanitize()?;

    // parse client-facing API address
    let api_addr: SocketAddr = format!("{}:{}", args.bind_ip, args.port)
        .parse()
        .map_err(|e| {
            ChaseError::msg(format!(
                "failed to parse api_addr: bind_ip {} port {}: {}",
                args.bind_ip, args.port, e
            ))
        })?;

    // set up termination signals handler
    let (tx_term, rx_term) = watch::channel(false);
    ctrlc::set_handler(move || {
        if let Err(e) = tx_term.send(true) {
            pf_error!("error sending to term channel: {}", e);
        }
    })?;

    let config_str = args.config_str();
    let log_level = log::max_level();
    {
        // create tokio multi-threaded runtime
        let runtime = Builder::new_multi_thread()
            .enable_all()
            .worker_threads(args.threads)
            .thread_name("tokio-worker-server")
            .build()?;

        // enter tokio runtime, build the replicas, and start the dispatch
        // loop
        runtime.block_on(async move {
            let mut server = LookupServer::new_and_setup(
                api_addr,
                args.elements,
                args.value_size,
                config_str.as_deref(),
            )
            .await?;

            server.run(rx_term).await?;
            pf_info!("server shutting down");

            // suppress logging before dropping the runtime to avoid spurious
            // error messages
            log::set_max_level(LevelFilter::Off);

            Ok::<(), ChaseError>(()) // give type hint for this async closure
        })?;
    } // drop the runtime here

    log::set_max_level(log_level);
    Ok(())
}

/// Main function of the lookup server.
fn main() -> ExitCode {
    logger_init();
    logger_set_me("s");

    if let Err(ref e) = server_main() {
        pf_error!("server_main exited: {}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
