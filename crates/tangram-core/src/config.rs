//! 引擎配置
//!
//! 所有容差和捕捉参数都通过 [`EngineConfig`] 显式传入，不使用全局状态。

use serde::{Deserialize, Serialize};

/// 几何容差
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToleranceConfig {
    /// SAT 投影重叠小于该值视为分离（相接）
    pub overlap: f64,
    /// 顶点重合容差
    pub vertex: f64,
    /// 点在线段上 / 边共线的距离容差
    pub edge: f64,
    /// 平行判定的分母阈值
    pub parallel: f64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            overlap: 0.1,
            vertex: 1.0,
            edge: 1.0,
            parallel: 1e-10,
        }
    }
}

/// 滑动停靠点集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum SlideSnapSet {
    /// 0%, 25%, 50%, 75%, 100%
    #[default]
    FiveStop,
    /// 0%, 50%, 100%
    ThreeStop,
}

impl SlideSnapSet {
    /// 停靠点占范围的比例
    pub fn fractions(&self) -> &'static [f64] {
        match self {
            SlideSnapSet::FiveStop => &[0.0, 0.25, 0.5, 0.75, 1.0],
            SlideSnapSet::ThreeStop => &[0.0, 0.5, 1.0],
        }
    }
}

/// 捕捉配置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapConfig {
    /// 旋转角度步长（度）
    pub rotation_step: f64,
    /// 滑动停靠点
    pub slide_stops: SlideSnapSet,
    /// 计算滑动限位时的探测步长
    pub slide_scan_step: f64,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            rotation_step: 45.0,
            slide_stops: SlideSnapSet::FiveStop,
            slide_scan_step: 5.0,
        }
    }
}

/// 连通性判定所用的图边
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ConnectivityMode {
    /// 只使用显式连接
    #[default]
    ConnectionsOnly,
    /// 显式连接 + 几何上的顶点/边接触
    ConnectionsAndTouches,
}

/// 引擎配置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 局部坐标到世界坐标的视觉缩放
    pub visual_scale: f64,
    pub tolerance: ToleranceConfig,
    pub snap: SnapConfig,
    pub connectivity: ConnectivityMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            visual_scale: 50.0,
            tolerance: ToleranceConfig::default(),
            snap: SnapConfig::default(),
            connectivity: ConnectivityMode::default(),
        }
    }
}
