//! 捕捉规则
//!
//! 旋转只允许落在固定步长（默认 45°）的候选角度上；
//! 滑动只允许停在约束范围的固定比例位置上（默认 0/25/50/75/100%）。

use crate::config::SnapConfig;
use serde::{Deserialize, Serialize};

/// 捕捉结果（随变换结果一起返回给调用方）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SnapInfo {
    /// 未发生捕捉（放置/拖动）
    None,
    /// 旋转：请求角度与实际采用的候选角度
    Angle { requested: f64, snapped: f64 },
    /// 滑动：请求距离、实际停靠距离及停靠点序号
    Slide {
        requested: f64,
        snapped: f64,
        stop_index: usize,
    },
}

/// 相对旋转的候选角度：`-180, -180+step, ..., 180`
pub fn rotation_candidates(config: &SnapConfig) -> Vec<f64> {
    let step = if config.rotation_step > 0.0 {
        config.rotation_step
    } else {
        45.0
    };
    let count = (360.0 / step).round() as i64;
    (0..=count).map(|i| -180.0 + i as f64 * step).collect()
}

/// 在候选集合中取离 `requested` 最近的角度
///
/// 距离相同时取绝对值较小者（倾向少转）。
pub fn nearest_angle(requested: f64, candidates: &[f64]) -> Option<f64> {
    candidates.iter().copied().min_by(|a, b| {
        let da = (a - requested).abs();
        let db = (b - requested).abs();
        da.total_cmp(&db).then(a.abs().total_cmp(&b.abs()))
    })
}

/// 约束范围内的滑动停靠位置
pub fn slide_stops(range: f64, config: &SnapConfig) -> Vec<f64> {
    let range = range.max(0.0);
    config
        .slide_stops
        .fractions()
        .iter()
        .map(|f| f * range)
        .collect()
}

/// 取离 `requested` 最近的停靠点：`(序号, 距离)`
pub fn snap_slide(requested: f64, range: f64, config: &SnapConfig) -> (usize, f64) {
    slide_stops(range, config)
        .into_iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (a - requested).abs().total_cmp(&(b - requested).abs()))
        .unwrap_or((0, 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SlideSnapSet;

    #[test]
    fn test_rotation_candidates() {
        let candidates = rotation_candidates(&SnapConfig::default());
        assert_eq!(candidates.len(), 9);
        assert_eq!(candidates[0], -180.0);
        assert_eq!(candidates[4], 0.0);
        assert_eq!(candidates[8], 180.0);
    }

    #[test]
    fn test_nearest_angle() {
        let candidates = rotation_candidates(&SnapConfig::default());
        assert_eq!(nearest_angle(30.0, &candidates), Some(45.0));
        assert_eq!(nearest_angle(-100.0, &candidates), Some(-90.0));
        assert_eq!(nearest_angle(22.5, &candidates), Some(0.0));
        assert_eq!(nearest_angle(10.0, &[]), None);
    }

    #[test]
    fn test_snap_slide_five_and_three_stops() {
        let five = SnapConfig::default();
        assert_eq!(snap_slide(30.0, 100.0, &five), (1, 25.0));
        assert_eq!(snap_slide(-10.0, 100.0, &five), (0, 0.0));
        assert_eq!(snap_slide(500.0, 100.0, &five), (4, 100.0));

        let three = SnapConfig {
            slide_stops: SlideSnapSet::ThreeStop,
            ..SnapConfig::default()
        };
        assert_eq!(snap_slide(30.0, 100.0, &three), (1, 50.0));
        assert_eq!(slide_stops(0.0, &three), vec![0.0, 0.0, 0.0]);
    }
}
