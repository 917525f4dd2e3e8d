use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use acne_region_analyzer::{
    AcneAnalyzer, AnalysisError, AnalyzerConfig, ConfigError, DetectionBox, DominantRegion,
    FaceLandmarks, LandmarkDetector, ObjectDetector, Point2D, Region, RegionDefinition,
};
use anyhow::{anyhow, Result};
use image::{ImageFormat, Rgb, RgbImage};

const IMAGE_SIZE: u32 = 256;

/// Each region is painted in its own colour so the fake detector can tell crops apart.
const FOREHEAD: Rgb<u8> = Rgb([255, 0, 0]);
const NOSE: Rgb<u8> = Rgb([0, 255, 0]);
const LEFT_CHEEK: Rgb<u8> = Rgb([0, 0, 255]);
const RIGHT_CHEEK: Rgb<u8> = Rgb([255, 255, 0]);
const CHIN: Rgb<u8> = Rgb([0, 255, 255]);

/// Region corners in sixteenths of the image, so every denormalized value is exact.
fn layout() -> Vec<(Region, [u32; 4], Rgb<u8>)> {
    vec![
        (Region::Forehead, [2, 1, 14, 4], FOREHEAD),
        (Region::Nose, [7, 5, 9, 9], NOSE),
        (Region::LeftCheek, [2, 5, 6, 10], LEFT_CHEEK),
        (Region::RightCheek, [10, 5, 14, 10], RIGHT_CHEEK),
        (Region::Chin, [5, 11, 11, 15], CHIN),
    ]
}

fn face_image() -> RgbImage {
    let mut image = RgbImage::new(IMAGE_SIZE, IMAGE_SIZE);
    for (_, [x0, y0, x1, y1], color) in layout() {
        for y in y0 * 16..y1 * 16 {
            for x in x0 * 16..x1 * 16 {
                image.put_pixel(x, y, color);
            }
        }
    }
    image
}

/// Two landmarks per region, at opposite corners of its box.
fn face_landmarks() -> FaceLandmarks {
    let points = layout()
        .into_iter()
        .flat_map(|(_, [x0, y0, x1, y1], _)| {
            [
                Point2D::new(x0 as f32 / 16.0, y0 as f32 / 16.0),
                Point2D::new(x1 as f32 / 16.0, y1 as f32 / 16.0),
            ]
        })
        .collect();
    FaceLandmarks::new(points)
}

fn test_config() -> AnalyzerConfig {
    AnalyzerConfig {
        regions: layout()
            .iter()
            .enumerate()
            .map(|(i, (region, _, _))| RegionDefinition::new(*region, vec![2 * i, 2 * i + 1]))
            .collect(),
        ..AnalyzerConfig::default()
    }
}

struct FakeLandmarker {
    landmarks: Option<FaceLandmarks>,
    count: usize,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl FakeLandmarker {
    fn new(landmarks: Option<FaceLandmarks>) -> Self {
        FakeLandmarker {
            landmarks,
            count: 10,
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl LandmarkDetector for FakeLandmarker {
    fn landmark_count(&self) -> usize {
        self.count
    }

    fn detect(&mut self, _image: &RgbImage) -> Result<Option<FaceLandmarks>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("landmark model crashed"));
        }
        Ok(self.landmarks.clone())
    }
}

/// Answers by the colour at the centre of the crop.
struct FakeDetector {
    responses: HashMap<[u8; 3], Vec<DetectionBox>>,
    fail_on: Option<Rgb<u8>>,
    calls: Arc<AtomicUsize>,
}

impl FakeDetector {
    fn new(responses: Vec<(Rgb<u8>, Vec<DetectionBox>)>) -> Self {
        FakeDetector {
            responses: responses.into_iter().map(|(color, boxes)| (color.0, boxes)).collect(),
            fail_on: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl ObjectDetector for FakeDetector {
    fn infer(&mut self, crop: &RgbImage) -> Result<Vec<DetectionBox>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(crop.dimensions(), (640, 640));
        let center = *crop.get_pixel(320, 320);
        if self.fail_on == Some(center) {
            return Err(anyhow!("detector session lost"));
        }
        Ok(self.responses.get(&center.0).cloned().unwrap_or_default())
    }
}

fn acne(bbox: [f32; 4], confidence: f32) -> DetectionBox {
    DetectionBox::new(bbox, 0, confidence)
}

/// Forehead and chin each get two detections that survive filtering.
fn forehead_and_chin_detector() -> FakeDetector {
    FakeDetector::new(vec![
        (
            FOREHEAD,
            vec![
                acne([0.0, 0.0, 640.0, 640.0], 0.9),
                acne([320.0, 320.0, 480.0, 480.0], 0.4),
                acne([10.0, 10.0, 20.0, 20.0], 0.39),
                DetectionBox::new([10.0, 10.0, 20.0, 20.0], 1, 0.99),
            ],
        ),
        (CHIN, vec![acne([0.0, 0.0, 64.0, 64.0], 0.7), acne([64.0, 64.0, 128.0, 128.0], 0.55)]),
        (NOSE, vec![acne([0.0, 0.0, 64.0, 64.0], 0.1)]),
    ])
}

#[test]
fn forehead_wins_a_tie_with_chin() {
    let analyzer = AcneAnalyzer::new(
        test_config(),
        FakeLandmarker::new(Some(face_landmarks())),
        forehead_and_chin_detector(),
    )
    .unwrap();
    let result = analyzer.analyze(&face_image()).unwrap();

    assert_eq!(result.total_count, 4);
    assert_eq!(result.count_by_region[&Region::Forehead], 2);
    assert_eq!(result.count_by_region[&Region::Chin], 2);
    assert_eq!(result.count_by_region[&Region::Nose], 0);
    assert_eq!(result.count_by_region[&Region::LeftCheek], 0);
    assert_eq!(result.count_by_region[&Region::RightCheek], 0);
    assert_eq!(result.dominant_region, DominantRegion::Region(Region::Forehead));
    assert_eq!(result.total_count, result.count_by_region.values().sum::<usize>());
}

#[test]
fn detections_are_mapped_back_to_image_pixels() {
    let analyzer = AcneAnalyzer::new(
        test_config(),
        FakeLandmarker::new(Some(face_landmarks())),
        forehead_and_chin_detector(),
    )
    .unwrap();
    let result = analyzer.analyze(&face_image()).unwrap();

    // forehead box is (32, 16)-(224, 64): 192 wide, 48 tall
    let forehead = &result.boxes_by_region[&Region::Forehead];
    assert_close(forehead[0].bbox, [32.0, 16.0, 224.0, 64.0]);
    assert_close(forehead[1].bbox, [128.0, 40.0, 176.0, 52.0]);

    // chin box is (80, 176)-(176, 240): 96 wide, 64 tall
    let chin = &result.boxes_by_region[&Region::Chin];
    assert_close(chin[0].bbox, [80.0, 176.0, 89.6, 182.4]);
}

fn assert_close(actual: [f32; 4], expected: [f32; 4]) {
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-3, "{actual:?} != {expected:?}");
    }
}

#[test]
fn nothing_found_means_none() {
    let analyzer = AcneAnalyzer::new(
        test_config(),
        FakeLandmarker::new(Some(face_landmarks())),
        FakeDetector::new(vec![]),
    )
    .unwrap();
    let result = analyzer.analyze(&face_image()).unwrap();

    assert_eq!(result.total_count, 0);
    assert_eq!(result.dominant_region, DominantRegion::None);
    assert!(result.face_detected());
    assert_eq!(result.count_by_region.len(), 5);
}

#[test]
fn no_face_skips_every_region() {
    let detector = forehead_and_chin_detector();
    let detector_calls = detector.calls.clone();
    let analyzer = AcneAnalyzer::new(test_config(), FakeLandmarker::new(None), detector).unwrap();

    for image in [face_image(), RgbImage::new(32, 32)] {
        let result = analyzer.analyze(&image).unwrap();
        assert_eq!(result.dominant_region, DominantRegion::NoFaceDetected);
        assert_eq!(result.total_count, 0);
        assert!(result.count_by_region.is_empty());
        assert!(result.boxes_by_region.is_empty());
    }
    assert_eq!(detector_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn degenerate_region_counts_zero_and_others_continue() {
    let mut landmarks = face_landmarks();
    // collapse the chin box to a horizontal line
    landmarks.points[9].y = landmarks.points[8].y;
    let detector = forehead_and_chin_detector();
    let detector_calls = detector.calls.clone();
    let analyzer =
        AcneAnalyzer::new(test_config(), FakeLandmarker::new(Some(landmarks)), detector).unwrap();

    let result = analyzer.analyze(&face_image()).unwrap();
    assert_eq!(result.count_by_region[&Region::Chin], 0);
    assert_eq!(result.count_by_region[&Region::Forehead], 2);
    assert_eq!(result.total_count, 2);
    assert_eq!(result.dominant_region, DominantRegion::Region(Region::Forehead));
    assert_eq!(detector_calls.load(Ordering::SeqCst), 4);
}

#[test]
fn region_order_in_config_does_not_matter() {
    let mut reversed = test_config();
    reversed.regions.reverse();

    let forward = AcneAnalyzer::new(
        test_config(),
        FakeLandmarker::new(Some(face_landmarks())),
        forehead_and_chin_detector(),
    )
    .unwrap()
    .analyze(&face_image())
    .unwrap();
    let backward = AcneAnalyzer::new(
        reversed,
        FakeLandmarker::new(Some(face_landmarks())),
        forehead_and_chin_detector(),
    )
    .unwrap()
    .analyze(&face_image())
    .unwrap();

    assert_eq!(forward, backward);
}

#[test]
fn threshold_comes_from_config() {
    let config = AnalyzerConfig {
        confidence_threshold: 0.6,
        ..test_config()
    };
    let analyzer = AcneAnalyzer::new(
        config,
        FakeLandmarker::new(Some(face_landmarks())),
        forehead_and_chin_detector(),
    )
    .unwrap();
    let result = analyzer.analyze(&face_image()).unwrap();

    assert_eq!(result.count_by_region[&Region::Forehead], 1);
    assert_eq!(result.count_by_region[&Region::Chin], 1);
    assert_eq!(result.dominant_region, DominantRegion::Region(Region::Forehead));
}

#[test]
fn bad_landmark_index_is_rejected_up_front() {
    let mut config = test_config();
    config.regions[2].landmark_indices.push(10);
    let err = AcneAnalyzer::new(
        config,
        FakeLandmarker::new(Some(face_landmarks())),
        FakeDetector::new(vec![]),
    )
    .err()
    .unwrap();
    assert_eq!(
        err,
        ConfigError::LandmarkIndexOutOfRange {
            region: Region::LeftCheek,
            index: 10,
            landmark_count: 10,
        }
    );
}

#[test]
fn short_landmark_set_fails_loudly_at_request_time() {
    let mut landmarks = face_landmarks();
    landmarks.points.truncate(6);
    let analyzer = AcneAnalyzer::new(
        test_config(),
        FakeLandmarker::new(Some(landmarks)),
        FakeDetector::new(vec![]),
    )
    .unwrap();
    let err = analyzer.analyze(&face_image()).unwrap_err();
    assert!(matches!(err, AnalysisError::Config(ConfigError::LandmarkIndexOutOfRange { .. })));
}

#[test]
fn decode_failure_is_distinct_from_no_face() {
    let landmarker = FakeLandmarker::new(None);
    let landmark_calls = landmarker.calls.clone();
    let analyzer = AcneAnalyzer::new(test_config(), landmarker, FakeDetector::new(vec![])).unwrap();

    let err = analyzer.analyze_bytes(b"definitely not a png").unwrap_err();
    assert!(matches!(err, AnalysisError::Decode(_)));
    assert_eq!(landmark_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn encoded_bytes_go_through_the_same_pipeline() {
    let mut png = Vec::new();
    face_image().write_to(&mut Cursor::new(&mut png), ImageFormat::Png).unwrap();

    let analyzer = AcneAnalyzer::new(
        test_config(),
        FakeLandmarker::new(Some(face_landmarks())),
        forehead_and_chin_detector(),
    )
    .unwrap();
    let result = analyzer.analyze_bytes(&png).unwrap();
    assert_eq!(result.total_count, 4);
    assert_eq!(result.dominant_region, DominantRegion::Region(Region::Forehead));
}

#[test]
fn landmark_failure_propagates() {
    let mut landmarker = FakeLandmarker::new(Some(face_landmarks()));
    landmarker.fail = true;
    let analyzer = AcneAnalyzer::new(test_config(), landmarker, FakeDetector::new(vec![])).unwrap();
    assert!(matches!(analyzer.analyze(&face_image()), Err(AnalysisError::Landmark(_))));
}

#[test]
fn detector_failure_names_the_region() {
    let mut detector = forehead_and_chin_detector();
    detector.fail_on = Some(NOSE);
    let analyzer =
        AcneAnalyzer::new(test_config(), FakeLandmarker::new(Some(face_landmarks())), detector).unwrap();
    match analyzer.analyze(&face_image()) {
        Err(AnalysisError::Detection { region, .. }) => assert_eq!(region, Region::Nose),
        other => panic!("expected detection failure, got {other:?}"),
    }
}

#[test]
fn default_table_runs_on_a_full_mesh() {
    // 468 points on a 26 x 18 grid covering the middle of the frame
    let points = (0..468)
        .map(|i| Point2D::new(0.25 + (i % 26) as f32 / 52.0, 0.25 + (i / 26) as f32 / 36.0))
        .collect();
    let mut landmarker = FakeLandmarker::new(Some(FaceLandmarks::new(points)));
    landmarker.count = 468;
    let detector = FakeDetector::new(vec![]);
    let detector_calls = detector.calls.clone();

    let analyzer = AcneAnalyzer::new(AnalyzerConfig::default(), landmarker, detector).unwrap();
    let result = analyzer.analyze(&face_image()).unwrap();

    assert_eq!(result.dominant_region, DominantRegion::None);
    assert_eq!(result.count_by_region.len(), 5);
    assert_eq!(detector_calls.load(Ordering::SeqCst), 5);
}
