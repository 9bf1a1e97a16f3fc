use anyhow::Result;

use crate::detect::{BlobExtractor, BlobParams, CircleExtractor, CircleParams, Detection, ShapeExtractor};
use crate::frame::{Frame, HsvFrame};
use crate::range::RangeEstimator;
use crate::segment::{segment, ColorClassSpec};

/// One configured target: color class, extraction strategy, optional range.
pub struct TrackedClass {
    spec: ColorClassSpec,
    extractor: Box<dyn ShapeExtractor>,
    range: Option<RangeEstimator>,
}

impl TrackedClass {
    pub fn circle(spec: ColorClassSpec, params: CircleParams) -> Self {
        Self::with_extractor(spec, Box::new(CircleExtractor::new(params)))
    }

    pub fn blob(spec: ColorClassSpec, params: BlobParams) -> Self {
        Self::with_extractor(spec, Box::new(BlobExtractor::new(params)))
    }

    /// Any other detector that turns a class mask into a detection.
    pub fn with_extractor(spec: ColorClassSpec, extractor: Box<dyn ShapeExtractor>) -> Self {
        Self {
            spec,
            extractor,
            range: None,
        }
    }

    pub fn with_range(mut self, range: RangeEstimator) -> Self {
        self.range = Some(range);
        self
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    pub fn strategy(&self) -> &'static str {
        self.extractor.name()
    }

    /// Segment, extract and range this class in one HSV frame.
    pub fn observe(&mut self, hsv: &HsvFrame) -> ClassObservation {
        let mask = segment(hsv, &self.spec);
        let detection = match self.extractor.extract(&mask) {
            Ok(detection) => detection,
            Err(err) => {
                log::warn!(
                    "{}: {} extractor failed, treating as absent: {:#}",
                    self.spec.name(),
                    self.extractor.name(),
                    err
                );
                Detection::absent()
            }
        };
        let distance = self.range.and_then(|range| range.estimate(&detection));
        ClassObservation {
            name: self.spec.name().to_string(),
            detection,
            distance,
        }
    }
}

/// What one class looked like in one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassObservation {
    pub name: String,
    pub detection: Detection,
    /// Advisory range, in the units of the class's real diameter.
    pub distance: Option<f64>,
}

/// Tracked classes in priority order, most important first.
pub struct Perception {
    classes: Vec<TrackedClass>,
}

impl Perception {
    pub fn new(classes: Vec<TrackedClass>) -> Result<Self> {
        if classes.is_empty() {
            anyhow::bail!("at least one tracked class is required");
        }
        let mut seen = std::collections::HashSet::new();
        for class in &classes {
            if !seen.insert(class.name().to_string()) {
                anyhow::bail!("duplicate tracked class '{}'", class.name());
            }
        }
        Ok(Self { classes })
    }

    pub fn classes(&self) -> &[TrackedClass] {
        &self.classes
    }

    /// Observations in priority order. The frame is converted to HSV once.
    pub fn observe(&mut self, frame: &Frame) -> Vec<ClassObservation> {
        let hsv = frame.to_hsv();
        self.classes.iter_mut().map(|class| class.observe(&hsv)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Mask;
    use crate::segment::{pink_ranges, red_ranges};

    struct Failing;

    impl ShapeExtractor for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn extract(&mut self, _mask: &Mask) -> Result<Detection> {
            anyhow::bail!("model not loaded")
        }
    }

    fn goal() -> Result<TrackedClass> {
        Ok(TrackedClass::blob(
            ColorClassSpec::new("goal", pink_ranges())?,
            BlobParams::default(),
        ))
    }

    #[test]
    fn observes_blob_with_range() -> Result<()> {
        let mut frame = Frame::filled(200, 100, [40, 40, 40]);
        frame.fill_rect(100, 20, 40, 40, [200, 40, 230]);
        let mut perception = Perception::new(vec![goal()?.with_range(RangeEstimator::new(10.0, 1000.0)?)])?;

        let obs = perception.observe(&frame);
        assert_eq!(obs.len(), 1);
        assert!(obs[0].detection.valid);
        assert_eq!(obs[0].name, "goal");
        assert!(obs[0].distance.is_some());
        Ok(())
    }

    #[test]
    fn extractor_fault_reads_as_absent() -> Result<()> {
        let spec = ColorClassSpec::new("ball", red_ranges())?;
        let mut class = TrackedClass::with_extractor(spec, Box::new(Failing));
        let obs = class.observe(&Frame::filled(8, 8, [0, 0, 255]).to_hsv());
        assert!(!obs.detection.valid);
        assert_eq!(obs.distance, None);
        Ok(())
    }

    #[test]
    fn rejects_empty_or_duplicate_classes() -> Result<()> {
        assert!(Perception::new(Vec::new()).is_err());
        assert!(Perception::new(vec![goal()?, goal()?]).is_err());
        Ok(())
    }
}
