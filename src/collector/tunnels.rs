use super::ProbeError;
use crate::core::TunnelTable;
use crate::metrics::{MetricSink, Sample, TUNNELS};

/// Emits one `gtp_tunnels` sample per PDP context. Returns the sample count.
pub(super) fn collect(table: &dyn TunnelTable, sink: &mut dyn MetricSink) -> Result<usize, ProbeError> {
    let tunnels = table.tunnels()?;
    for tunnel in &tunnels {
        sink.emit(Sample::new(
            &TUNNELS,
            vec![tunnel.version.to_string(), tunnel.peer.to_string()],
            1.0,
        ));
    }
    Ok(tunnels.len())
}
