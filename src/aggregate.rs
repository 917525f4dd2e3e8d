use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};
use tracing::info;

use crate::detection::DetectionBox;
use crate::region::Region;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DominantRegion {
    Region(Region),
    /// A face was found but no region had a detection.
    None,
    NoFaceDetected,
}

impl DominantRegion {
    pub fn as_str(&self) -> &'static str {
        match self {
            DominantRegion::Region(region) => region.as_str(),
            DominantRegion::None => "none",
            DominantRegion::NoFaceDetected => "no_face_detected",
        }
    }
}

impl fmt::Display for DominantRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DominantRegion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Outcome of one analysis. Region maps are empty when no face was detected.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub total_count: usize,
    pub count_by_region: BTreeMap<Region, usize>,
    pub dominant_region: DominantRegion,
    pub boxes_by_region: BTreeMap<Region, Vec<DetectionBox>>,
}

impl AnalysisResult {
    pub fn no_face() -> Self {
        AnalysisResult {
            total_count: 0,
            count_by_region: BTreeMap::new(),
            dominant_region: DominantRegion::NoFaceDetected,
            boxes_by_region: BTreeMap::new(),
        }
    }

    pub fn face_detected(&self) -> bool {
        self.dominant_region != DominantRegion::NoFaceDetected
    }
}

/// Region with the highest count; ties go to whichever comes first in `priority`.
///
/// Only the counts matter, never the order they are supplied in.
pub fn select_dominant<I>(counts: I, priority: &[Region]) -> DominantRegion
where
    I: IntoIterator<Item = (Region, usize)>,
{
    let counts = counts.into_iter().collect::<BTreeMap<_, _>>();
    let max_count = counts.values().copied().max().unwrap_or(0);
    if max_count == 0 {
        return DominantRegion::None;
    }
    priority
        .iter()
        .find(|region| counts.get(*region).copied() == Some(max_count))
        .map(|&region| DominantRegion::Region(region))
        .unwrap_or(DominantRegion::None)
}

/// Counts the remapped detections of every region and decides the dominant one.
pub fn aggregate<I>(region_results: I, priority: &[Region]) -> AnalysisResult
where
    I: IntoIterator<Item = (Region, Vec<DetectionBox>)>,
{
    let mut boxes_by_region: BTreeMap<Region, Vec<DetectionBox>> =
        Region::ALL.into_iter().map(|r| (r, vec![])).collect();
    for (region, boxes) in region_results {
        boxes_by_region.entry(region).or_default().extend(boxes);
    }
    let count_by_region = boxes_by_region
        .iter()
        .map(|(&region, boxes)| (region, boxes.len()))
        .collect::<BTreeMap<_, _>>();
    let total_count: usize = count_by_region.values().sum();

    let dominant_region = if total_count == 0 {
        DominantRegion::None
    } else {
        select_dominant(count_by_region.iter().map(|(&r, &c)| (r, c)), priority)
    };
    info!("{total_count} detections, dominant region: {dominant_region}");

    AnalysisResult {
        total_count,
        count_by_region,
        dominant_region,
        boxes_by_region,
    }
}
