//! Annotation driver: annotate every manifest unit that has no output yet.

pub mod vep;

#[doc(inline)]
pub use vep::{VepAnnotator, VepConfig};

use crate::config::Context;
use crate::manifest::{self, ContigList, Unit};
use color_eyre::eyre::{Report, Result};
use loftee_path::{is_empty_listing, Catalog, PathDx};
use log::{error, info, warn};
use serde::Serialize;
use std::fmt::{Display, Formatter};
use tabled::builder::Builder;

/// Split, annotate and persist one input file.
pub trait Annotator {
    /// Annotate `input` into `output`, overwriting it.
    ///
    /// `permit_shuffle` relaxes the row order check after splitting multi-allelic sites.
    fn annotate(&self, input: &PathDx, output: &PathDx, permit_shuffle: bool) -> Result<(), Report>;
}

// ----------------------------------------------------------------------------
// Summary
// ----------------------------------------------------------------------------

/// Outcome of one unit.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum Outcome {
    /// Annotated on the first attempt.
    Annotated,
    /// Annotated with `permit_shuffle` after a failed first attempt.
    Retried,
    /// Both attempts failed.
    Failed,
    /// The input could not be staged, no attempt was made.
    StageFailed,
    /// Output already listed in the destination.
    Skipped,
}

/// Per-unit outcomes of one driver run, in manifest order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Summary {
    pub units: Vec<(Unit, Outcome)>,
}

impl Summary {
    pub fn units_with(&self, outcome: Outcome) -> Vec<&Unit> {
        self.units.iter().filter(|(_, o)| *o == outcome).map(|(unit, _)| unit).collect()
    }

    /// Number of annotation calls made.
    pub fn n_attempts(&self) -> usize {
        self.units
            .iter()
            .map(|(_, outcome)| match outcome {
                Outcome::Annotated => 1,
                Outcome::Retried | Outcome::Failed => 2,
                Outcome::StageFailed | Outcome::Skipped => 0,
            })
            .sum()
    }
}

impl Display for Summary {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let mut builder = Builder::default();
        builder.push_record(["Outcome", "Units"]);
        for outcome in [
            Outcome::Annotated,
            Outcome::Retried,
            Outcome::Failed,
            Outcome::StageFailed,
            Outcome::Skipped,
        ] {
            let units = self.units_with(outcome);
            builder.push_record([format!("{outcome:?}"), units.len().to_string()]);
        }
        write!(f, "{}", builder.build())
    }
}

// ----------------------------------------------------------------------------
// Driver
// ----------------------------------------------------------------------------

/// Annotate every unit of the requested contigs whose output is not listed in the destination.
///
/// Units are visited in natural manifest order, one at a time. Each input is
/// staged to local storage, annotated, and retried once with
/// `permit_shuffle` on failure. A unit that fails twice is logged and left
/// incomplete. The staged copy is removed after every attempt.
///
/// A destination that does not map to storage fails the run before any unit.
pub async fn annotate_all<C, A>(
    context: &Context<C>,
    annotator: &A,
    contigs: &ContigList,
) -> Result<Summary, Report>
where
    C: Catalog,
    A: Annotator + ?Sized,
{
    let dest = context.dest_root().await?;
    context.store.locate(&dest)?;
    let listed = match dest.list(&context.catalog).await {
        Ok(listed) => listed,
        Err(e) if is_empty_listing(&e) => {
            warn!("{e}");
            Vec::new()
        }
        Err(e) => return Err(e),
    };

    let entries = manifest::scan(&context.manifest_root(), &context.catalog).await?;
    let mut summary = Summary::default();

    for entry in entries.into_iter().filter(|entry| contigs.contains(&entry.unit.contig)) {
        let output = dest.join(entry.unit.table_name());
        if listed.contains(&output) {
            info!("{output} already annotated");
            summary.units.push((entry.unit, Outcome::Skipped));
            continue;
        }
        info!("{output}");

        let staged = match context.store.stage(&entry.input, &context.config.staging_dir) {
            Ok(staged) => staged,
            Err(e) => {
                error!("Failed to stage {}: {e:?}", entry.input);
                summary.units.push((entry.unit, Outcome::StageFailed));
                continue;
            }
        };
        let outcome = annotate_unit(annotator, &staged.path_dx(), &output);
        drop(staged);
        summary.units.push((entry.unit, outcome));
    }

    info!("Annotation summary:\n{summary}");
    Ok(summary)
}

/// One attempt, then one relaxed retry.
fn annotate_unit<A>(annotator: &A, input: &PathDx, output: &PathDx) -> Outcome
where
    A: Annotator + ?Sized,
{
    let Err(e) = annotator.annotate(input, output, false) else {
        return Outcome::Annotated;
    };
    error!("ERROR: {input}: {e}");
    warn!("Rerunning with permit_shuffle=true");

    match annotator.annotate(input, output, true) {
        Ok(()) => Outcome::Retried,
        Err(e) => {
            error!("{e:?}");
            error!("SECOND TRY FAILED, PLEASE CHECK FILE MANUALLY: {input}");
            Outcome::Failed
        }
    }
}

#[cfg(test)]
mod tests;
