//! # Transaction State Metrics
//!
//! Prometheus metrics for the transaction store. They are only created for
//! metered construction and are registered on the registry the caller injects,
//! never on the global default registry.
//!
//! ## Metrics Exported
//!
//! - `txs_state_utxos_added_total` - Counter of UTXOs added
//! - `txs_state_utxos_deleted_total` - Counter of UTXOs deleted
//! - `txs_state_current_stakers` - Gauge of current stakers
//! - `txs_state_writes_total` - Counter of successful flushes
//! - `txs_state_written_entries_total` - Counter of records flushed

use prometheus::core::Collector;
use prometheus::{IntCounter, IntGauge, Registry};
use strata_core::{StrataError, StrataResult};

/// Metric handles owned by a metered transaction store
#[derive(Clone)]
pub struct TxMetrics {
    pub utxos_added: IntCounter,
    pub utxos_deleted: IntCounter,
    pub current_stakers: IntGauge,
    pub writes: IntCounter,
    pub written_entries: IntCounter,
}

impl TxMetrics {
    /// Create all metrics and register them on `registry`.
    ///
    /// Fails if any metric is already registered there.
    pub fn register(registry: &Registry) -> StrataResult<Self> {
        let metrics = Self {
            utxos_added: IntCounter::new("txs_state_utxos_added_total", "Total UTXOs added")
                .map_err(metrics_error)?,
            utxos_deleted: IntCounter::new(
                "txs_state_utxos_deleted_total",
                "Total UTXOs deleted",
            )
            .map_err(metrics_error)?,
            current_stakers: IntGauge::new(
                "txs_state_current_stakers",
                "Number of current stakers",
            )
            .map_err(metrics_error)?,
            writes: IntCounter::new("txs_state_writes_total", "Total transaction state flushes")
                .map_err(metrics_error)?,
            written_entries: IntCounter::new(
                "txs_state_written_entries_total",
                "Total records flushed by the transaction state",
            )
            .map_err(metrics_error)?,
        };

        for (index, collector) in metrics.collectors().into_iter().enumerate() {
            if let Err(err) = registry.register(collector) {
                // leave the registry as it was
                for registered in metrics.collectors().into_iter().take(index) {
                    let _ = registry.unregister(registered);
                }
                return Err(metrics_error(err));
            }
        }

        Ok(metrics)
    }

    fn collectors(&self) -> Vec<Box<dyn Collector>> {
        vec![
            Box::new(self.utxos_added.clone()),
            Box::new(self.utxos_deleted.clone()),
            Box::new(self.current_stakers.clone()),
            Box::new(self.writes.clone()),
            Box::new(self.written_entries.clone()),
        ]
    }
}

fn metrics_error(err: prometheus::Error) -> StrataError {
    StrataError::MetricsError(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_exports_metrics() {
        let registry = Registry::new();
        let metrics = TxMetrics::register(&registry).unwrap();
        metrics.utxos_added.inc();

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"txs_state_utxos_added_total".to_string()));
        assert!(names.contains(&"txs_state_current_stakers".to_string()));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();
        TxMetrics::register(&registry).unwrap();
        let err = TxMetrics::register(&registry).err().unwrap();
        assert!(matches!(err, StrataError::MetricsError(_)));
    }

    #[test]
    fn test_failed_registration_rolls_back() {
        let registry = Registry::new();
        let taken = IntCounter::new("txs_state_writes_total", "Registered elsewhere").unwrap();
        registry.register(Box::new(taken)).unwrap();

        assert!(TxMetrics::register(&registry).is_err());
        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert_eq!(names, vec!["txs_state_writes_total".to_string()]);
    }
}
