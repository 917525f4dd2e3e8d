//! The five anatomical face regions and the landmark indices that outline them.
//!
//! Indices refer to the 468-point MediaPipe face mesh topology.

use std::fmt;

use serde::{Deserialize, Serialize};

mod bbox;

pub use bbox::{extract_bounding_box, BoundingBox};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Forehead,
    Nose,
    LeftCheek,
    RightCheek,
    Chin,
}

impl Region {
    pub const ALL: [Region; 5] = [
        Region::Forehead,
        Region::Nose,
        Region::LeftCheek,
        Region::RightCheek,
        Region::Chin,
    ];

    /// Tie-break order used when several regions share the highest count.
    pub const DEFAULT_PRIORITY: [Region; 5] = [
        Region::Forehead,
        Region::Chin,
        Region::LeftCheek,
        Region::RightCheek,
        Region::Nose,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Forehead => "forehead",
            Region::Nose => "nose",
            Region::LeftCheek => "left_cheek",
            Region::RightCheek => "right_cheek",
            Region::Chin => "chin",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RegionDefinition {
    pub region: Region,
    pub landmark_indices: Vec<usize>,
}

impl RegionDefinition {
    pub fn new(region: Region, landmark_indices: Vec<usize>) -> Self {
        RegionDefinition { region, landmark_indices }
    }

    /// Default table. Repeated indices are kept as-is; they do not change the enclosing box.
    pub fn defaults() -> Vec<RegionDefinition> {
        let forehead: Vec<usize> = [
            8, 9, 10, 107, 66, 105, 63, 70, 71, 109, 108, 151, 296, 334, 293, 300, 299, 383, 368,
            389, 356, 337, 276, 283, 282, 295, 285, 336,
        ]
        .into_iter()
        .chain(65..69)
        .collect();
        let nose = vec![
            0, 1, 2, 5, 6, 45, 275, 274, 164, 165, 97, 98, 99, 2, 94, 240, 218, 219, 220, 237, 218,
            134, 399, 398,
        ];
        let left_cheek = vec![
            116, 117, 118, 119, 120, 121, 128, 130, 132, 226, 113, 225, 224, 223, 222, 221, 189,
            190, 137, 139, 146,
        ];
        let right_cheek: Vec<usize> = [
            345, 346, 347, 348, 349, 350, 359, 361, 447, 366, 436, 435, 414, 398, 397,
        ]
        .into_iter()
        .chain(380..390)
        .collect();
        let chin = vec![0, 17, 170, 175, 364, 335, 172, 152, 395, 396, 397, 400];

        vec![
            RegionDefinition::new(Region::Forehead, forehead),
            RegionDefinition::new(Region::Nose, nose),
            RegionDefinition::new(Region::LeftCheek, left_cheek),
            RegionDefinition::new(Region::RightCheek, right_cheek),
            RegionDefinition::new(Region::Chin, chin),
        ]
    }
}
