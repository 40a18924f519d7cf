//! Input manifest naming scheme: units of work, natural ordering, batching and readiness.

use color_eyre::eyre::{eyre, Report, Result};
use itertools::Itertools;
use loftee_path::{is_empty_listing, Catalog, PathDx};
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Formatter;
use std::str::FromStr;
use std::sync::OnceLock;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Name of the completion marker written last by every table write.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Regular expression matched against input file names.
pub const UNIT_PATTERN: &str = r"^ukb23157_c(\d{1,2}|X|Y)_b(\d{1,3})_v1\.vcf\.gz$";

// ----------------------------------------------------------------------------
// Contig
// ----------------------------------------------------------------------------

/// A chromosome identifier.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, EnumIter, EnumString, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub enum Contig {
    #[strum(serialize = "1")]
    #[serde(rename = "1")]
    Chr1,
    #[strum(serialize = "2")]
    #[serde(rename = "2")]
    Chr2,
    #[strum(serialize = "3")]
    #[serde(rename = "3")]
    Chr3,
    #[strum(serialize = "4")]
    #[serde(rename = "4")]
    Chr4,
    #[strum(serialize = "5")]
    #[serde(rename = "5")]
    Chr5,
    #[strum(serialize = "6")]
    #[serde(rename = "6")]
    Chr6,
    #[strum(serialize = "7")]
    #[serde(rename = "7")]
    Chr7,
    #[strum(serialize = "8")]
    #[serde(rename = "8")]
    Chr8,
    #[strum(serialize = "9")]
    #[serde(rename = "9")]
    Chr9,
    #[strum(serialize = "10")]
    #[serde(rename = "10")]
    Chr10,
    #[strum(serialize = "11")]
    #[serde(rename = "11")]
    Chr11,
    #[strum(serialize = "12")]
    #[serde(rename = "12")]
    Chr12,
    #[strum(serialize = "13")]
    #[serde(rename = "13")]
    Chr13,
    #[strum(serialize = "14")]
    #[serde(rename = "14")]
    Chr14,
    #[strum(serialize = "15")]
    #[serde(rename = "15")]
    Chr15,
    #[strum(serialize = "16")]
    #[serde(rename = "16")]
    Chr16,
    #[strum(serialize = "17")]
    #[serde(rename = "17")]
    Chr17,
    #[strum(serialize = "18")]
    #[serde(rename = "18")]
    Chr18,
    #[strum(serialize = "19")]
    #[serde(rename = "19")]
    Chr19,
    #[strum(serialize = "20")]
    #[serde(rename = "20")]
    Chr20,
    #[strum(serialize = "21")]
    #[serde(rename = "21")]
    Chr21,
    #[strum(serialize = "22")]
    #[serde(rename = "22")]
    Chr22,
    #[strum(serialize = "X")]
    #[serde(rename = "X")]
    X,
    #[strum(serialize = "Y")]
    #[serde(rename = "Y")]
    Y,
}

/// A requested set of contigs, parsed from a comma-separated list.
///
/// ```rust
/// use loftee::manifest::{Contig, ContigList};
/// use std::str::FromStr;
///
/// let contigs = ContigList::from_str("1,X,22")?;
/// assert_eq!(contigs.0, vec![Contig::Chr1, Contig::X, Contig::Chr22]);
/// assert_eq!(contigs.to_string(), "1,X,22");
/// assert_eq!(ContigList::default().0.len(), 24);
/// assert!(ContigList::from_str("1,23").is_err());
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ContigList(pub Vec<Contig>);

impl Default for ContigList {
    fn default() -> Self {
        ContigList(Contig::iter().collect())
    }
}

impl ContigList {
    pub fn contains(&self, contig: &Contig) -> bool {
        self.0.contains(contig)
    }
}

impl FromStr for ContigList {
    type Err = Report;

    fn from_str(s: &str) -> Result<Self, Report> {
        let contigs = s
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| Contig::from_str(name).map_err(|_| eyre!("Unknown contig: {name:?}")))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ContigList(contigs))
    }
}

impl std::fmt::Display for ContigList {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0.iter().join(","))
    }
}

// ----------------------------------------------------------------------------
// Unit
// ----------------------------------------------------------------------------

/// One (contig, block) pair: one input VCF and one annotated output table.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Unit {
    pub contig: Contig,
    pub block: String,
}

/// The compiled [`UNIT_PATTERN`].
pub fn unit_regex() -> Result<&'static Regex, Report> {
    static REGEX: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    REGEX
        .get_or_init(|| Regex::new(UNIT_PATTERN))
        .as_ref()
        .map_err(|e| eyre!("Invalid unit pattern {UNIT_PATTERN:?}: {e}"))
}

impl Unit {
    /// Match an input file name, [`None`] for names outside the naming scheme.
    ///
    /// ```rust
    /// use loftee::manifest::{Contig, Unit};
    ///
    /// let unit = Unit::parse("ukb23157_c10_b3_v1.vcf.gz").unwrap();
    /// assert_eq!(unit.contig, Contig::Chr10);
    /// assert_eq!(unit.block, "3");
    /// assert_eq!(unit.table_name(), "chr-10-b3.mt");
    ///
    /// assert!(Unit::parse("ukb23157_c23_b0_v1.vcf.gz").is_none());
    /// assert!(Unit::parse("ukb23157_c1_b1234_v1.vcf.gz").is_none());
    /// assert!(Unit::parse("ukb23157_c1_b0_v1.vcf.gz.tbi").is_none());
    /// ```
    pub fn parse(name: &str) -> Option<Unit> {
        let captures = unit_regex().ok()?.captures(name)?;
        let contig = Contig::from_str(captures.get(1)?.as_str()).ok()?;
        let block = captures.get(2)?.as_str().to_string();
        Some(Unit { contig, block })
    }

    /// Name of the annotated output table.
    pub fn table_name(&self) -> String {
        format!("chr-{}-b{}.mt", self.contig, self.block)
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "c{}_b{}", self.contig, self.block)
    }
}

/// A manifest entry: the input file and the unit it maps to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Entry {
    pub input: PathDx,
    pub unit: Unit,
}

// ----------------------------------------------------------------------------
// Natural Sort
// ----------------------------------------------------------------------------

/// One run of a natural sort key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NameChunk {
    Text(String),
    Number(u64),
}

impl Ord for NameChunk {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (NameChunk::Number(a), NameChunk::Number(b)) => a.cmp(b),
            (NameChunk::Text(a), NameChunk::Text(b)) => a.cmp(b),
            // numbers sort before text
            (NameChunk::Number(_), NameChunk::Text(_)) => Ordering::Less,
            (NameChunk::Text(_), NameChunk::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for NameChunk {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Natural sort key: alternating non-digit and digit runs, digits compared as integers.
///
/// ```rust
/// use loftee::manifest::nsort;
///
/// let mut names = vec!["b2", "b10", "b1"];
/// names.sort_by_key(|name| nsort(name));
/// assert_eq!(names, ["b1", "b2", "b10"]);
/// ```
pub fn nsort(name: &str) -> Vec<NameChunk> {
    name.chars()
        .group_by(|c| c.is_ascii_digit())
        .into_iter()
        .map(|(is_digit, run)| {
            let run: String = run.collect();
            match is_digit {
                // runs too long for u64 fall back to text
                true => run.parse().map(NameChunk::Number).unwrap_or(NameChunk::Text(run)),
                false => NameChunk::Text(run),
            }
        })
        .collect()
}

// ----------------------------------------------------------------------------
// Batching
// ----------------------------------------------------------------------------

/// Split `0..n` into `k` contiguous slices of as-equal-as-possible size.
///
/// The first `n % k` slices carry one extra element.
///
/// ```rust
/// use loftee::manifest::split_list;
/// assert_eq!(split_list(5, 3), [(0, 2), (2, 4), (4, 5)]);
/// assert_eq!(split_list(0, 2), [(0, 0), (0, 0)]);
/// ```
pub fn split_list(n: usize, k: usize) -> Vec<(usize, usize)> {
    if k == 0 {
        return Vec::new();
    }
    let (length, remainder) = (n / k, n % k);
    let mut start = 0;
    (0..k)
        .map(|i| {
            let end = start + length + usize::from(i < remainder);
            let slice = (start, end);
            start = end;
            slice
        })
        .collect()
}

/// Number of batches for `n` units: `max(1, floor(n / min_batch))`.
///
/// ```rust
/// use loftee::manifest::batch_count;
/// assert_eq!(batch_count(5, 19), 1);
/// assert_eq!(batch_count(38, 19), 2);
/// assert_eq!(batch_count(57, 19), 3);
/// ```
pub fn batch_count(n: usize, min_batch: usize) -> usize {
    (n / min_batch.max(1)).max(1)
}

// ----------------------------------------------------------------------------
// Manifest Scan
// ----------------------------------------------------------------------------

/// List the manifest directory, in natural order, keeping only names that match.
///
/// Fails if [`UNIT_PATTERN`] does not compile.
pub async fn scan<C>(root: &PathDx, catalog: &C) -> Result<Vec<Entry>, Report>
where
    C: Catalog + ?Sized,
{
    unit_regex()?;
    let mut files = root.list(catalog).await?;
    files.sort_by_cached_key(|file| nsort(file.file_name().unwrap_or_default()));

    let entries = files
        .into_iter()
        .filter_map(|input| {
            let name = input.file_name()?;
            match Unit::parse(name) {
                Some(unit) => Some(Entry { unit, input }),
                None => {
                    debug!("Skipping manifest entry: {input}");
                    None
                }
            }
        })
        .collect_vec();

    Ok(entries)
}

// ----------------------------------------------------------------------------
// Readiness
// ----------------------------------------------------------------------------

/// Completion state of one unit's output table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Readiness {
    /// Output exists and holds the completion marker.
    Ready,
    /// Output is not listed in the destination.
    NoOutput,
    /// Output exists without the completion marker.
    NoMarker,
    /// Output could not be listed.
    Unreadable(String),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        *self == Readiness::Ready
    }
}

impl std::fmt::Display for Readiness {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Readiness::Ready => write!(f, "OK"),
            Readiness::NoOutput => write!(f, "FAIL (no file)"),
            Readiness::NoMarker => write!(f, "FAIL (no {SUCCESS_MARKER})"),
            Readiness::Unreadable(e) => write!(f, "FAIL ({e})"),
        }
    }
}

/// Check whether `output` is complete, given the destination listing `listed`.
///
/// ```rust
/// use loftee::manifest::{readiness, Readiness};
/// use loftee_path::{MemoryCatalog, PathDx};
/// # tokio_test::block_on(async {
/// let mut catalog = MemoryCatalog::new();
/// catalog.add_file("database-1", "/chr-1-b0.mt/_SUCCESS");
/// catalog.add_file("database-1", "/chr-1-b1.mt/metadata.json");
///
/// let dest = PathDx::from_database_id("database-1", [""; 0]);
/// let listed = dest.list(&catalog).await?;
/// assert_eq!(readiness(&dest.join("chr-1-b0.mt"), &listed, &catalog).await, Readiness::Ready);
/// assert_eq!(readiness(&dest.join("chr-1-b1.mt"), &listed, &catalog).await, Readiness::NoMarker);
/// assert_eq!(readiness(&dest.join("chr-1-b2.mt"), &listed, &catalog).await, Readiness::NoOutput);
/// # Ok::<(), color_eyre::eyre::Report>(())
/// # }).unwrap();
/// ```
pub async fn readiness<C>(output: &PathDx, listed: &[PathDx], catalog: &C) -> Readiness
where
    C: Catalog + ?Sized,
{
    if !listed.contains(output) {
        return Readiness::NoOutput;
    }
    match output.list(catalog).await {
        Ok(children) => {
            let marked = children
                .iter()
                .any(|child| child.file_name().is_some_and(|name| name.contains(SUCCESS_MARKER)));
            match marked {
                true => Readiness::Ready,
                false => Readiness::NoMarker,
            }
        }
        Err(e) if is_empty_listing(&e) => Readiness::NoMarker,
        Err(e) => Readiness::Unreadable(e.to_string()),
    }
}

#[cfg(test)]
mod tests;
