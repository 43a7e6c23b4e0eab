//! Lookup server node: builds the replica set, brings up the front ends, and
//! runs the single dispatch loop.

use std::net::SocketAddr;

use crate::server::external::ExternalApi;
use crate::server::messages::MAX_ARRAY_LEN;
use crate::server::state::ServerState;
use crate::store::{codec, ReplicaSet, ScatterMode, NUM_LIST};
use crate::utils::ChaseError;

use serde::Deserialize;

use tokio::sync::watch;
use tokio::task;

/// Configuration parameters struct.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Number of list replicas to build.
    pub num_replicas: usize,

    /// Scatter mode name: "lookup" or "hop".
    pub scatter: String,

    /// Answer misses with an explicit not-found reply.
    pub miss_reply: bool,

    /// Also serve requests over UDP.
    pub enable_udp: bool,

    /// Capacity of the request channel into the dispatch loop.
    pub chan_req_cap: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            num_replicas: NUM_LIST,
            scatter: "lookup".into(),
            miss_reply: false,
            enable_udp: true,
            chan_req_cap: 1024,
        }
    }
}

/// Lookup server node.
pub struct LookupServer {
    /// Lookup state owned by the dispatch loop.
    state: ServerState,

    /// Client-facing front ends.
    external_api: ExternalApi,
}

impl LookupServer {
    /// Parses config, builds the replica set, and binds the front ends at
    /// `api_addr`. The server does not serve anything until `run()`.
    pub async fn new_and_setup(
        api_addr: SocketAddr,
        num_elements: usize,
        value_size: usize,
        config_str: Option<&str>,
    ) -> Result<Self, ChaseError> {
        let config = parsed_config!(config_str => ServerConfig;
                                    num_replicas, scatter, miss_reply,
                                    enable_udp, chan_req_cap)?;
        if config.num_replicas == 0 || config.num_replicas > NUM_LIST {
            return logged_err!(
                "invalid config.num_replicas '{}'",
                config.num_replicas
            );
        }
        let Some(scatter) = ScatterMode::parse_name(&config.scatter) else {
            return logged_err!("invalid config.scatter '{}'", config.scatter);
        };
        if config.chan_req_cap == 0 {
            return logged_err!(
                "invalid config.chan_req_cap '{}'",
                config.chan_req_cap
            );
        }
        if num_elements == 0 {
            return logged_err!("invalid number of elements {}", num_elements);
        }
        if codec::words_per_value(value_size) > MAX_ARRAY_LEN {
            return logged_err!(
                "value size {} exceeds {} words",
                value_size,
                MAX_ARRAY_LEN
            );
        }
        pf_debug!("server config: {:?}", config);

        let num_replicas = config.num_replicas;
        pf_info!(
            "building {} replicas of {} elements x {} B ...",
            num_replicas,
            num_elements,
            value_size
        );
        let replicas = task::spawn_blocking(move || {
            ReplicaSet::build(num_replicas, num_elements, value_size)
        })
        .await
        .map_err(|e| ChaseError::msg(format!("replica build panicked: {}", e)))??;

        let state = ServerState::new(replicas, scatter, config.miss_reply)?;

        let mut external_api = ExternalApi::new();
        external_api
            .setup(api_addr, config.enable_udp, config.chan_req_cap)
            .await?;

        Ok(LookupServer {
            state,
            external_api,
        })
    }

    /// Gets the bound TCP address.
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.external_api.tcp_addr()
    }

    /// Gets the bound UDP address, if UDP is enabled.
    pub fn udp_addr(&self) -> Option<SocketAddr> {
        self.external_api.udp_addr()
    }

    /// Main event loop of the server: handles requests one at a time until
    /// a termination signal comes in through `rx_term`.
    pub async fn run(
        &mut self,
        mut rx_term: watch::Receiver<bool>,
    ) -> Result<(), ChaseError> {
        pf_info!("server ready, serving lookups");

        loop {
            tokio::select! {
                // client request
                incoming = self.external_api.get_req() => {
                    let (client, req, reply_slot) = incoming?;
                    pf_trace!("request from {}: {:?}", client, req);
                    if let Some(reply) = self.state.handle(&req) {
                        if reply_slot.send(reply).is_err() {
                            pf_debug!("client {} gone before reply", client);
                        }
                    }
                },

                // termination signal
                _ = rx_term.changed() => {
                    pf_warn!("server caught termination signal");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod node_tests {
    use super::*;
    use crate::client::{
        DriverClosedLoop, DriverReply, QueryGenerator, TransportKind,
    };
    use tokio::task::JoinHandle;
    use tokio::time::Duration;

    async fn spawn_server(
        num_elements: usize,
        value_size: usize,
        config_str: &str,
    ) -> Result<
        (
            SocketAddr,
            Option<SocketAddr>,
            watch::Sender<bool>,
            JoinHandle<Result<(), ChaseError>>,
        ),
        ChaseError,
    > {
        let mut server = LookupServer::new_and_setup(
            "127.0.0.1:0".parse()?,
            num_elements,
            value_size,
            Some(config_str),
        )
        .await?;
        let tcp_addr = server.tcp_addr().unwrap();
        let udp_addr = server.udp_addr();
        let (tx_term, rx_term) = watch::channel(false);
        let handle = tokio::spawn(async move { server.run(rx_term).await });
        Ok((tcp_addr, udp_addr, tx_term, handle))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn config_rejected() -> Result<(), ChaseError> {
        let addr: SocketAddr = "127.0.0.1:0".parse()?;
        for config_str in [
            "num_replicas = 0",
            "num_replicas = 131073",
            "scatter = 'sideways'",
            "chan_req_cap = 0",
            "no_such_field = 1",
        ] {
            assert!(LookupServer::new_and_setup(addr, 4, 16, Some(config_str))
                .await
                .is_err());
        }
        assert!(LookupServer::new_and_setup(addr, 0, 16, None)
            .await
            .is_err());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn tcp_lookup_and_ping() -> Result<(), ChaseError> {
        let (tcp_addr, _, tx_term, handle) =
            spawn_server(4, 16, "num_replicas = 8").await?;

        let mut driver = DriverClosedLoop::new(
            TransportKind::Tcp.new_endpoint(tcp_addr),
            Duration::from_secs(5),
        );
        driver.connect().await?;
        match driver.ping().await? {
            DriverReply::Null => {}
            reply => panic!("unexpected ping reply {:?}", reply),
        }
        for key in 0..4 {
            match driver.lookup(key).await? {
                DriverReply::Value { words, .. } => {
                    assert_eq!(words, vec![key * 100, key * 100 + 8])
                }
                reply => panic!("unexpected lookup reply {:?}", reply),
            }
        }
        driver.leave().await?;

        tx_term.send(true)?;
        handle.await.unwrap()?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn udp_lookup() -> Result<(), ChaseError> {
        let (_, udp_addr, tx_term, handle) =
            spawn_server(8, 24, "num_replicas = 4\nscatter = 'hop'").await?;

        let mut driver = DriverClosedLoop::new(
            TransportKind::Udp.new_endpoint(udp_addr.unwrap()),
            Duration::from_secs(5),
        );
        driver.connect().await?;
        match driver.lookup(7).await? {
            DriverReply::Value { words, .. } => {
                assert_eq!(words, vec![700, 708, 716])
            }
            reply => panic!("unexpected lookup reply {:?}", reply),
        }
        driver.leave().await?;

        tx_term.send(true)?;
        handle.await.unwrap()?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn udp_oversized_reply() -> Result<(), ChaseError> {
        let (_, udp_addr, tx_term, handle) =
            spawn_server(2, 128 * 1024, "num_replicas = 2").await?;

        let mut driver = DriverClosedLoop::new(
            TransportKind::Udp.new_endpoint(udp_addr.unwrap()),
            Duration::from_secs(5),
        );
        driver.connect().await?;
        match driver.lookup(1).await? {
            DriverReply::Failure { result } => {
                assert_eq!(result, crate::server::CallResult::SystemErr)
            }
            reply => panic!("unexpected lookup reply {:?}", reply),
        }

        tx_term.send(true)?;
        handle.await.unwrap()?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn silent_miss_times_out() -> Result<(), ChaseError> {
        let (tcp_addr, _, tx_term, handle) =
            spawn_server(4, 8, "num_replicas = 2").await?;

        let mut driver = DriverClosedLoop::new(
            TransportKind::Tcp.new_endpoint(tcp_addr),
            Duration::from_millis(300),
        );
        driver.connect().await?;
        match driver.lookup(4).await? {
            DriverReply::Timeout => {}
            reply => panic!("unexpected lookup reply {:?}", reply),
        }
        // server still serves on the same connection
        match driver.lookup(3).await? {
            DriverReply::Value { words, .. } => assert_eq!(words, vec![300]),
            reply => panic!("unexpected lookup reply {:?}", reply),
        }
        driver.leave().await?;

        tx_term.send(true)?;
        handle.await.unwrap()?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn explicit_miss_reply() -> Result<(), ChaseError> {
        let (tcp_addr, _, tx_term, handle) =
            spawn_server(4, 8, "num_replicas = 2\nmiss_reply = true").await?;

        let mut driver = DriverClosedLoop::new(
            TransportKind::Tcp.new_endpoint(tcp_addr),
            Duration::from_secs(5),
        );
        driver.connect().await?;
        match driver.lookup(99).await? {
            DriverReply::NotFound => {}
            reply => panic!("unexpected lookup reply {:?}", reply),
        }
        driver.leave().await?;

        tx_term.send(true)?;
        handle.await.unwrap()?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn query_generator_passes() -> Result<(), ChaseError> {
        let (tcp_addr, _, tx_term, handle) =
            spawn_server(16, 32, "num_replicas = 16").await?;

        let mut generator = QueryGenerator::new(
            TransportKind::Tcp.new_endpoint(tcp_addr),
            Duration::from_secs(5),
            true,
            Some("repetitions = 2\nsettle_ms = 0\nseed = 7"),
        )?;
        let stats = generator.run(50, 16, 32).await?;
        assert_eq!(stats.len(), 100);
        let report = stats.summarize()?;
        assert!(report.min > 0.0);
        assert!(report.min <= report.p50 && report.p50 <= report.max);

        tx_term.send(true)?;
        handle.await.unwrap()?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn idle_connection_not_blocking() -> Result<(), ChaseError> {
        let (tcp_addr, _, tx_term, handle) =
            spawn_server(4, 16, "num_replicas = 2").await?;

        // connects but never sends its client ID
        let idle = tokio::net::TcpStream::connect(tcp_addr).await?;

        let mut driver = DriverClosedLoop::new(
            TransportKind::Tcp.new_endpoint(tcp_addr),
            Duration::from_secs(2),
        );
        let served = tokio::time::timeout(Duration::from_secs(3), async {
            driver.connect().await?;
            let reply = driver.lookup(2).await?;
            driver.leave().await?;
            Ok::<DriverReply, ChaseError>(reply)
        })
        .await;
        match served {
            Ok(Ok(DriverReply::Value { words, .. })) => {
                assert_eq!(words, vec![200, 208])
            }
            Ok(reply) => panic!("unexpected lookup outcome {:?}", reply),
            Err(_) => panic!("client stuck behind idle connection"),
        }
        drop(idle);

        tx_term.send(true)?;
        handle.await.unwrap()?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn query_generator_aborts_on_timeout() -> Result<(), ChaseError> {
        let (tcp_addr, _, tx_term, handle) =
            spawn_server(4, 8, "num_replicas = 2").await?;

        // keys drawn from [0, 64) mostly miss the 4-element lists
        let mut generator = QueryGenerator::new(
            TransportKind::Tcp.new_endpoint(tcp_addr),
            Duration::from_millis(300),
            false,
            Some("settle_ms = 0\nseed = 3"),
        )?;
        assert!(generator.run(50, 64, 8).await.is_err());

        tx_term.send(true)?;
        handle.await.unwrap()?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn query_generator_aborts_on_miss() -> Result<(), ChaseError> {
        let (tcp_addr, _, tx_term, handle) =
            spawn_server(4, 8, "num_replicas = 2\nmiss_reply = true").await?;

        let mut generator = QueryGenerator::new(
            TransportKind::Tcp.new_endpoint(tcp_addr),
            Duration::from_secs(5),
            false,
            Some("settle_ms = 0\nseed = 3"),
        )?;
        let err = generator.run(50, 64, 8).await.unwrap_err();
        assert!(err.to_string().contains("not found"));

        tx_term.send(true)?;
        handle.await.unwrap()?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn query_generator_wrong_length() -> Result<(), ChaseError> {
        let (tcp_addr, _, tx_term, handle) =
            spawn_server(8, 16, "num_replicas = 2").await?;

        // expects 3 words per value while the server holds 2
        let mut generator = QueryGenerator::new(
            TransportKind::Tcp.new_endpoint(tcp_addr),
            Duration::from_secs(5),
            false,
            Some("settle_ms = 0\nseed = 3"),
        )?;
        let err = generator.run(10, 8, 24).await.unwrap_err();
        assert!(err.to_string().contains("RESULT WRONG"));

        tx_term.send(true)?;
        handle.await.unwrap()?;
        Ok(())
    }
}
