//! Parameter synchronization between hosts after each epoch.

use std::thread;
use std::time::{Duration, Instant};

use crate::common::error::{PipelineError, PipelineResult};
use crate::store::{ObjectStore, StorePath};

use super::domain::SyncMode;

/// Combines the local parameters with those of the other hosts.
pub trait ParameterSync {
    fn mode(&self) -> SyncMode;

    /// Exchange parameters at the end of `epoch` and return the values
    /// every host continues from.
    fn sync(&mut self, epoch: usize, params: Vec<f32>) -> PipelineResult<Vec<f32>>;
}

/// Single host: parameters pass through untouched.
#[derive(Debug, Default)]
pub struct LocalSync;

impl ParameterSync for LocalSync {
    fn mode(&self) -> SyncMode {
        SyncMode::Local
    }

    fn sync(&mut self, _epoch: usize, params: Vec<f32>) -> PipelineResult<Vec<f32>> {
        Ok(params)
    }
}

/// Averages parameters through a store shared by all hosts.
///
/// Each host publishes `<run_id>/epoch-NNNNN/<host>.json`, waits until
/// every host in the list has published, then takes the element-wise mean.
/// Shards are equally sized so the plain mean weighs every host the same.
/// A host refuses to overwrite its own key, so a reused run id fails fast
/// instead of mixing in parameters of an earlier run.
pub struct StoreSync<'a> {
    store: &'a dyn ObjectStore,
    bucket: String,
    run_id: String,
    current_host: String,
    hosts: Vec<String>,
    poll_interval: Duration,
    timeout: Duration,
}

impl<'a> StoreSync<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        bucket: impl Into<String>,
        run_id: impl Into<String>,
        current_host: impl Into<String>,
        hosts: Vec<String>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            run_id: run_id.into(),
            current_host: current_host.into(),
            hosts,
            poll_interval: Duration::from_millis(200),
            timeout: Duration::from_secs(1800),
        }
    }

    pub fn with_timing(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.timeout = timeout;
        self
    }

    fn epoch_prefix(&self, epoch: usize) -> String {
        format!("{}/epoch-{epoch:05}/", self.run_id)
    }

    fn path(&self, epoch: usize, host: &str) -> StorePath {
        StorePath::new(&self.bucket, format!("{}{host}.json", self.epoch_prefix(epoch)))
    }

    fn wait_for_peers(&self, epoch: usize) -> PipelineResult<()> {
        let prefix = self.epoch_prefix(epoch);
        let started = Instant::now();
        loop {
            let published = self.store.list(&self.bucket, &prefix)?;
            let ready = self
                .hosts
                .iter()
                .filter(|host| {
                    let key = format!("{prefix}{host}.json");
                    published.iter().any(|m| m.key == key)
                })
                .count();
            if ready == self.hosts.len() {
                return Ok(());
            }
            if started.elapsed() >= self.timeout {
                return Err(PipelineError::store(
                    StorePath::new(&self.bucket, prefix),
                    format!("timed out with {ready}/{} hosts published", self.hosts.len()),
                ));
            }
            tracing::debug!(epoch, ready, hosts = self.hosts.len(), "waiting for peers");
            thread::sleep(self.poll_interval);
        }
    }
}

impl ParameterSync for StoreSync<'_> {
    fn mode(&self) -> SyncMode {
        SyncMode::DistSync
    }

    fn sync(&mut self, epoch: usize, params: Vec<f32>) -> PipelineResult<Vec<f32>> {
        let own = self.path(epoch, &self.current_host);
        if self.store.exists(&own)? {
            return Err(PipelineError::store(
                &own,
                "parameters already published; run id reused?",
            ));
        }
        let body = serde_json::to_vec(&params)
            .map_err(|err| PipelineError::store(&own, err))?;
        self.store.put(&own, &body)?;
        self.wait_for_peers(epoch)?;

        let mut sum = vec![0.0f64; params.len()];
        for host in &self.hosts {
            let path = self.path(epoch, host);
            let peer: Vec<f32> = serde_json::from_slice(&self.store.get(&path)?)
                .map_err(|err| PipelineError::data_format(format!("{path}: {err}")))?;
            if peer.len() != sum.len() {
                return Err(PipelineError::data_format(format!(
                    "{path}: {} parameters, expected {}",
                    peer.len(),
                    sum.len()
                )));
            }
            for (acc, v) in sum.iter_mut().zip(peer) {
                *acc += f64::from(v);
            }
        }
        let n = self.hosts.len() as f64;
        tracing::info!(epoch, hosts = self.hosts.len(), "parameters averaged");
        Ok(sum.into_iter().map(|v| (v / n) as f32).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryObjectStore;

    fn hosts() -> Vec<String> {
        vec!["algo-1".into(), "algo-2".into()]
    }

    #[test]
    fn local_sync_is_identity() {
        let mut sync = LocalSync;
        assert_eq!(sync.sync(0, vec![1.0, 2.0]).unwrap(), vec![1.0, 2.0]);
        assert_eq!(sync.mode(), SyncMode::Local);
    }

    #[test]
    fn store_sync_averages_published_parameters() {
        let store = InMemoryObjectStore::new();
        store
            .put(
                &StorePath::new("sync", "job-1/epoch-00003/algo-2.json"),
                b"[3.0, 0.0]",
            )
            .unwrap();
        let mut sync = StoreSync::new(&store, "sync", "job-1", "algo-1", hosts())
            .with_timing(Duration::ZERO, Duration::from_secs(1));
        assert_eq!(sync.sync(3, vec![1.0, 2.0]).unwrap(), vec![2.0, 1.0]);
    }

    #[test]
    fn missing_peer_times_out() {
        let store = InMemoryObjectStore::new();
        let mut sync = StoreSync::new(&store, "sync", "job-1", "algo-1", hosts())
            .with_timing(Duration::from_millis(1), Duration::from_millis(5));
        assert!(matches!(
            sync.sync(0, vec![1.0]),
            Err(PipelineError::Store { .. })
        ));
    }

    #[test]
    fn earlier_run_is_not_averaged_in() {
        let store = InMemoryObjectStore::new();
        for host in hosts() {
            let key = format!("job-1/epoch-00000/{host}.json");
            store.put(&StorePath::new("sync", key), b"[100.0]").unwrap();
        }

        let mut rerun = StoreSync::new(&store, "sync", "job-2", "algo-1", hosts())
            .with_timing(Duration::from_millis(1), Duration::from_millis(5));
        assert!(matches!(
            rerun.sync(0, vec![1.0]),
            Err(PipelineError::Store { .. })
        ));

        let mut reused = StoreSync::new(&store, "sync", "job-1", "algo-1", hosts())
            .with_timing(Duration::from_millis(1), Duration::from_millis(5));
        let err = reused.sync(0, vec![1.0]).unwrap_err();
        assert!(err.to_string().contains("already published"));
    }

    #[test]
    fn both_hosts_converge_on_the_same_values() {
        let store = InMemoryObjectStore::new();
        let averaged = std::thread::scope(|scope| {
            let handles: Vec<_> = [("algo-1", vec![0.0, 4.0]), ("algo-2", vec![2.0, 0.0])]
                .into_iter()
                .map(|(host, params)| {
                    let store = &store;
                    scope.spawn(move || {
                        StoreSync::new(store, "sync", "job-1", host, hosts())
                            .with_timing(Duration::from_millis(1), Duration::from_secs(5))
                            .sync(0, params)
                            .unwrap()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });
        assert_eq!(averaged[0], vec![1.0, 2.0]);
        assert_eq!(averaged[0], averaged[1]);
    }
}
