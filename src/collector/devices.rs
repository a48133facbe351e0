use super::ProbeError;
use crate::core::{DeviceRecord, InterfaceDescriptor, LinkTable, Role};
use crate::metrics::{MetricSink, Sample, DEVICES};

/// Emits one `gtp_devices` sample per GTP link. Returns the sample count.
pub(super) fn collect(table: &dyn LinkTable, sink: &mut dyn MetricSink) -> Result<usize, ProbeError> {
    let mut count = 0;
    for device in table.links()?.into_iter().filter_map(gtp_device) {
        sink.emit(Sample::new(
            &DEVICES,
            vec![device.name, device.role.to_string()],
            1.0,
        ));
        count += 1;
    }
    Ok(count)
}

/// Keeps GTP links whose role could be read; everything else is skipped.
fn gtp_device(link: InterfaceDescriptor) -> Option<DeviceRecord> {
    if !link.is_gtp() {
        return None;
    }
    let role = Role::from_code(link.gtp_role?);
    Some(DeviceRecord {
        name: link.name,
        role,
    })
}
