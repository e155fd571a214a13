//! Nearest pose correspondences between traverses of the same route.

use indicatif::ProgressIterator;
use log::warn;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Error;
use crate::metric::PoseMetric;
use crate::pose_table::Timestamp;
use crate::progress::progress_bar;
use crate::se3::PoseSet;

/// Index of the smallest value. The first of several equal minima wins; NaNs are never chosen
/// unless every value is NaN.
fn argmin(values: &[f64]) -> Option<(usize, f64)> {
    values.iter().cloned().enumerate().fold(None, |best, (i, d)| match best {
        Some((_, b)) if !(d < b) && !b.is_nan() => best,
        _ => Some((i, d)),
    })
}

/// Index and distance of the closest pose in `query` for every pose in `reference`.
///
/// Each reference pose is compared against every query pose (no spatial index), so this is
/// `O(len(reference) * len(query))`. Output preserves the order of `reference`.
pub fn nearest(
    reference: &PoseSet,
    query: &PoseSet,
    metric: &PoseMetric,
    verbose: bool,
) -> Result<Vec<(usize, f64)>, Error> {
    let pb = progress_bar(reference.len() as u64, "Matching", verbose);
    reference
        .iter()
        .progress_with(pb)
        .map(|pose| {
            let d = metric.distance(&(*pose).into(), query)?;
            // distances are never empty since pose sets are never empty
            Ok(argmin(&d).unwrap_or((0, std::f64::NAN)))
        })
        .collect()
}

/// Reference rows whose match lies farther away than `limit`, each logged as a warning for
/// manual inspection. NaN distances are flagged too.
pub fn flag_distant(matches: &[(usize, f64)], limit: f64) -> Vec<usize> {
    matches
        .iter()
        .enumerate()
        .filter(|(_, (_, distance))| !(*distance <= limit))
        .map(|(i, (best, distance))| {
            warn!(
                "reference pose {} matched query pose {} at distance {:.3} (> {})",
                i, best, distance, limit
            );
            i
        })
        .collect()
}

/// Find, for every pose in `reference`, the index of the closest pose in `query`.
///
/// If `sanity_threshold` is set, matches farther away than it are passed through
/// [flag_distant]. They are still returned.
pub fn correspondences(
    reference: &PoseSet,
    query: &PoseSet,
    metric: &PoseMetric,
    sanity_threshold: Option<f64>,
    verbose: bool,
) -> Result<Vec<usize>, Error> {
    let matches = nearest(reference, query, metric, verbose)?;
    if let Some(limit) = sanity_threshold {
        flag_distant(&matches, limit);
    }
    Ok(matches.into_iter().map(|(best, _)| best).collect())
}

/// Timestamps of matched poses, one column per traverse.
///
/// The first column holds the reference keyframe timestamps. Each further column holds the
/// timestamps of the matched poses of one query traverse, row aligned with the reference. When
/// the reference only serves as a base for the queries, its column is left out of the output.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrespondenceTable {
    pub names: Vec<String>,
    pub columns: Vec<Vec<Timestamp>>,
    pub include_reference: bool,
}

impl CorrespondenceTable {
    pub fn new(reference: &str, timestamps: Vec<Timestamp>) -> Self {
        CorrespondenceTable {
            names: vec![reference.to_string()],
            columns: vec![timestamps],
            include_reference: true,
        }
    }

    /// Table whose rows follow the keyframes of base traverse `base`, without writing its column.
    pub fn with_base(base: &str, timestamps: Vec<Timestamp>) -> Self {
        CorrespondenceTable {
            include_reference: false,
            ..CorrespondenceTable::new(base, timestamps)
        }
    }

    pub fn num_rows(&self) -> usize {
        self.columns[0].len()
    }

    /// Add the matches into a query traverse: `matches[i]` indexes `timestamps` for row `i`.
    pub fn push_matches(
        &mut self,
        name: &str,
        timestamps: &[Timestamp],
        matches: &[usize],
    ) -> Result<(), Error> {
        if matches.len() != self.num_rows() {
            return Err(Error::ShapeMismatch {
                left: self.num_rows(),
                right: matches.len(),
            });
        }
        let column = matches
            .iter()
            .map(|&i| {
                timestamps.get(i).cloned().ok_or_else(|| {
                    Error::InvalidShape(format!(
                        "match {} out of bounds for {} timestamps",
                        i,
                        timestamps.len()
                    ))
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        self.names.push(name.to_string());
        self.columns.push(column);
        Ok(())
    }

    /// Write the table: a header row of traverse names followed by one row of timestamps per
    /// reference keyframe. Fields are space delimited and rows end with `\r\n`.
    pub fn write_to<W: Write>(&self, w: W) -> Result<(), std::io::Error> {
        let skip = if self.include_reference { 0 } else { 1 };
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b' ')
            .terminator(csv::Terminator::CRLF)
            .from_writer(w);
        wtr.write_record(self.names.iter().skip(skip))?;
        for row in 0..self.num_rows() {
            wtr.write_record(self.columns.iter().skip(skip).map(|c| c[row].to_string()))?;
        }
        wtr.flush()
    }

    pub fn write(&self, path: &Path) -> Result<(), std::io::Error> {
        let mut file = BufWriter::new(File::create(path)?);
        self.write_to(&mut file)?;
        file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::se3::{random_poses, Pose};

    #[test]
    fn nearest_on_line() {
        let reference = PoseSet::single(Pose::identity());
        let query = PoseSet::from_xyzrpy(&[[5., 0., 0., 0., 0., 0.], [1., 0., 0., 0., 0., 0.]])
            .unwrap();
        let m = correspondences(
            &reference,
            &query,
            &PoseMetric::translation_only(),
            None,
            false,
        )
        .unwrap();
        assert_eq!(m, vec![1]);
    }

    #[test]
    fn ties_pick_first() {
        let reference = PoseSet::single(Pose::identity());
        let query = PoseSet::from_xyzrpy(&[
            [3., 0., 0., 0., 0., 0.],
            [-1., 0., 0., 0., 0., 0.],
            [0., 1., 0., 0., 0., 0.],
        ])
        .unwrap();
        let m = correspondences(
            &reference,
            &query,
            &PoseMetric::translation_only(),
            None,
            false,
        )
        .unwrap();
        assert_eq!(m, vec![1]);
    }

    #[test]
    fn self_match_is_identity() {
        let poses = random_poses(40);
        let m = correspondences(&poses, &poses, &PoseMetric::new(10.0).unwrap(), Some(1.0), false)
            .unwrap();
        assert_eq!(m, (0..40).collect::<Vec<_>>());
    }

    #[test]
    fn flagged_matches_are_kept() {
        let reference = PoseSet::single(Pose::identity());
        let query = PoseSet::from_xyzrpy(&[[50., 0., 0., 0., 0., 0.], [20., 0., 0., 0., 0., 0.]])
            .unwrap();
        let m = correspondences(
            &reference,
            &query,
            &PoseMetric::translation_only(),
            Some(10.0),
            false,
        )
        .unwrap();
        assert_eq!(m, vec![1]);
    }

    #[test]
    fn distant_matches_are_flagged() {
        let reference = PoseSet::from_xyzrpy(&[[0., 0., 0., 0., 0., 0.], [-30., 0., 0., 0., 0., 0.]])
            .unwrap();
        let query = PoseSet::from_xyzrpy(&[[50., 0., 0., 0., 0., 0.], [1., 0., 0., 0., 0., 0.]])
            .unwrap();
        let matches = nearest(&reference, &query, &PoseMetric::translation_only(), false).unwrap();
        assert_eq!(matches, vec![(1, 1.0), (1, 31.0)]);
        assert_eq!(flag_distant(&matches, 10.0), vec![1]);
        assert_eq!(flag_distant(&matches, 40.0), Vec::<usize>::new());
        assert_eq!(flag_distant(&[(0, std::f64::NAN)], 30.0), vec![0]);
    }

    #[test]
    fn argmin_skips_nan() {
        assert_eq!(argmin(&[std::f64::NAN, 2.0, 1.0, 1.0]), Some((2, 1.0)));
        assert_eq!(argmin(&[]), None);
    }

    #[test]
    fn table_format() {
        let mut table = CorrespondenceTable::new("ref", vec![10, 20]);
        table.push_matches("a", &[100, 200, 300], &[2, 0]).unwrap();
        table.push_matches("b", &[7], &[0, 0]).unwrap();
        assert!(table.push_matches("c", &[7], &[0]).is_err());
        assert!(table.push_matches("c", &[7], &[0, 1]).is_err());

        let mut out = Vec::new();
        table.write_to(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "ref a b\r\n10 300 7\r\n20 100 7\r\n"
        );
    }

    #[test]
    fn table_without_base_column() {
        let mut table = CorrespondenceTable::with_base("base", vec![10, 20]);
        table.push_matches("a", &[100, 200], &[1, 0]).unwrap();
        table.push_matches("b", &[7, 8], &[0, 1]).unwrap();

        let mut out = Vec::new();
        table.write_to(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a b\r\n200 7\r\n100 8\r\n");
    }
}
