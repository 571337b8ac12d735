//! Report rendering port trait.

use std::io::Write;

use crate::domain::aggregate::BestResults;
use crate::domain::error::SmartDcaError;

/// Port for presenting the best results of a sweep.
pub trait ReportPort {
    fn render(&self, best: &BestResults) -> String;

    /// Default implementation: writes `render` to `out`.
    fn write(&self, best: &BestResults, out: &mut dyn Write) -> Result<(), SmartDcaError> {
        out.write_all(self.render(best).as_bytes())?;
        Ok(())
    }
}
