use super::ProbeError;
use crate::core::{ModuleFieldLookup, ModuleInfo};
use crate::metrics::{MetricSink, Sample, INFO};

/// Emits the single `gtp_info` sample. Nothing is emitted unless all three
/// fields were read.
pub(super) fn collect(
    lookup: &dyn ModuleFieldLookup,
    module: &str,
    sink: &mut dyn MetricSink,
) -> Result<usize, ProbeError> {
    let info = read(lookup, module)?;
    sink.emit(Sample::new(
        &INFO,
        vec![info.filename, info.description, info.srcversion],
        1.0,
    ));
    Ok(1)
}

fn read(lookup: &dyn ModuleFieldLookup, module: &str) -> Result<ModuleInfo, ProbeError> {
    let field = |name: &str| -> Result<String, ProbeError> {
        let value = lookup.lookup(module, name)?;
        Ok(value.trim_end_matches('\n').to_string())
    };
    Ok(ModuleInfo {
        filename: field("filename")?,
        description: field("description")?,
        srcversion: field("srcversion")?,
    })
}
