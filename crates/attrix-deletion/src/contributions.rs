//! Aggregate-contribution budget resets.

use attrix_core::{
  dao::MeasurementDao, report::AggregateReport, DatastoreError,
};
use tracing::warn;

/// Give back the aggregate-contribution budget the given reports consumed
/// from their sources.
///
/// Each source's counter drops by the report's histogram sum, clamped at
/// zero. Reports without a source reference are skipped; their source is
/// already gone and holds no budget to return.
pub fn reset_aggregate_contributions(
  dao: &mut dyn MeasurementDao,
  reports: &[AggregateReport],
) -> Result<(), DatastoreError> {
  for report in reports {
    let Some(source_id) = report.source_id else {
      warn!(report_id = %report.id, "aggregate report has no source, skipping contribution reset");
      continue;
    };

    let mut source = dao.get_source(source_id)?;
    let remaining = u64::from(source.aggregate_contributions)
      .saturating_sub(report.contribution_sum());
    // remaining <= the old counter, so it always fits back into u32.
    source.aggregate_contributions = remaining as u32;
    dao.update_source_aggregate_contributions(&source)?;
  }
  Ok(())
}
