//! Query generator: issues uniformly random lookups in closed loop, verifies
//! every returned value, and records per-call latencies.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::client::{DriverClosedLoop, DriverReply, GenericEndpoint};
use crate::stats::LatencyStats;
use crate::store::codec;
use crate::utils::ChaseError;

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

use serde::Deserialize;

use tokio::time::{self, Duration, Instant};

/// Mode parameters struct.
#[derive(Debug, Deserialize)]
pub struct ModeParamsQuery {
    /// Number of timed passes.
    pub repetitions: u32,

    /// Pause before each pass in millisecs.
    pub settle_ms: u64,

    /// Key generator seed; 0 means seed from the clock.
    pub seed: u64,
}

impl Default for ModeParamsQuery {
    fn default() -> Self {
        ModeParamsQuery {
            repetitions: 1,
            settle_ms: 2000,
            seed: 0,
        }
    }
}

/// Closed-loop lookup query generator.
pub struct QueryGenerator {
    /// Closed-loop call driver.
    driver: DriverClosedLoop,

    /// Mode parameters.
    params: ModeParamsQuery,

    /// Run an untimed warm-up pass first.
    warmup: bool,

    /// Key generator.
    rng: StdRng,
}

impl QueryGenerator {
    /// Creates a new query generator over an unconnected endpoint.
    pub fn new(
        endpoint: Box<dyn GenericEndpoint>,
        timeout: Duration,
        warmup: bool,
        params_str: Option<&str>,
    ) -> Result<Self, ChaseError> {
        let params = parsed_config!(params_str => ModeParamsQuery;
                                    repetitions, settle_ms, seed)?;
        if params.repetitions == 0 {
            return logged_err!(
                "invalid params.repetitions '{}'",
                params.repetitions
            );
        }
        if timeout.is_zero() {
            return logged_err!("invalid call timeout {:?}", timeout);
        }

        let seed = if params.seed == 0 {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(1)
        } else {
            params.seed
        };
        pf_info!("key generator seed {}", seed);

        Ok(QueryGenerator {
            driver: DriverClosedLoop::new(endpoint, timeout),
            params,
            warmup,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Connects, runs the optional warm-up pass plus the timed passes of
    /// `num_queries` lookups each over keys in `[0, num_elements)`, then
    /// leaves. Any timeout, miss, or wrong value aborts the run with an
    /// error. Returns the latencies of all timed lookups.
    pub async fn run(
        &mut self,
        num_queries: usize,
        num_elements: u64,
        value_size: usize,
    ) -> Result<LatencyStats, ChaseError> {
        if num_queries == 0 {
            return logged_err!("invalid number of queries {}", num_queries);
        }
        if num_elements == 0 {
            return logged_err!("invalid number of elements {}", num_elements);
        }

        self.driver.connect().await?;
        pf_info!("client {} connected", self.driver.id());

        let repetitions = self.params.repetitions as usize;
        let mut stats = LatencyStats::with_capacity(num_queries * repetitions);
        for r in 0..=repetitions {
            if r == 0 {
                if !self.warmup {
                    continue;
                }
                pf_info!("warm-up pass of {} lookups", num_queries);
            } else {
                pf_info!(
                    "timed pass {}/{} of {} lookups",
                    r,
                    repetitions,
                    num_queries
                );
            }

            time::sleep(Duration::from_millis(self.params.settle_ms)).await;
            let timed = if r == 0 { None } else { Some(&mut stats) };
            self.run_pass(num_queries, num_elements, value_size, timed)
                .await?;
        }

        self.driver.leave().await?;
        Ok(stats)
    }

    /// Runs one pass of lookups, recording latencies into `stats` if given.
    async fn run_pass(
        &mut self,
        num_queries: usize,
        num_elements: u64,
        value_size: usize,
        mut stats: Option<&mut LatencyStats>,
    ) -> Result<(), ChaseError> {
        let keys = Uniform::from(0..num_elements);
        let num_words = codec::words_per_value(value_size);

        for _ in 0..num_queries {
            let start = Instant::now();
            let key = keys.sample(&mut self.rng);

            let words = match self.driver.lookup(key).await? {
                DriverReply::Value { words, .. } => words,
                DriverReply::Timeout => {
                    return logged_err!(
                        "no response for key {} within {:?}",
                        key,
                        self.driver.timeout()
                    );
                }
                DriverReply::NotFound => {
                    return logged_err!("server reports key {} not found", key);
                }
                reply => {
                    return logged_err!(
                        "unexpected reply for key {}: {:?}",
                        key,
                        reply
                    );
                }
            };
            Self::verify(key, num_words, &words)?;

            let lat_us = start.elapsed().as_nanos() as f64 / 1000.0;
            if let Some(stats) = stats.as_mut() {
                stats.record(lat_us);
            }
        }

        Ok(())
    }

    /// Checks returned value words against the codec.
    fn verify(
        key: u64,
        num_words: usize,
        words: &[u64],
    ) -> Result<(), ChaseError> {
        if words.len() != num_words {
            return logged_err!(
                "RESULT WRONG: key {} got {} words, expected {}",
                key,
                words.len(),
                num_words
            );
        }
        if let Some(w) = codec::first_mismatch(key, words) {
            return logged_err!(
                "RESULT WRONG: key {} word {} is {}, expected {}",
                key,
                w,
                words[w],
                codec::value_at(key, w as u64)
            );
        }
        Ok(())
    }
}
