//! Segment classification from a visit count.

use crate::thresholds::SegmentThresholds;
use crm_core::Segment;

/// Classify a visit count against a threshold pair.
///
/// The pair is repaired first (`vip <= regular` behaves as `vip = regular + 1`),
/// so any input is accepted.
pub fn classify(visit_count: u32, regular_threshold: u32, vip_threshold: u32) -> Segment {
    SegmentThresholds::new(regular_threshold, vip_threshold).classify(visit_count)
}

impl SegmentThresholds {
    pub fn classify(&self, visit_count: u32) -> Segment {
        if visit_count >= self.vip() {
            Segment::Vip
        } else if visit_count >= self.regular() {
            Segment::Regular
        } else {
            Segment::New
        }
    }
}
