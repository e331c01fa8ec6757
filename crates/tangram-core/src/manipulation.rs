//! 操作分类
//!
//! 根据拼块当前的连接推导它能如何被移动，供界面决定显示哪种手势：
//! - 第一块，或有两个及以上连接 ⇒ 锁定
//! - 没有连接 ⇒ 自由拖动
//! - 恰好一个连接 ⇒ 顶点对顶点可旋转，其余可滑动
//!
//! 旋转中心、滑动轨道都按两块拼块**当前**的位置实时计算，不做缓存。

use crate::config::EngineConfig;
use crate::connection::{Connection, ConnectionType, ResolvedConnection};
use crate::engine::{RotationFrame, SlideFrame, TransformEngine};
use crate::error::EngineResult;
use crate::geometry::Segment;
use crate::math::Point2;
use crate::piece::Piece;
use crate::snap::{rotation_candidates, slide_stops};
use serde::{Deserialize, Serialize};

/// 拼块当前的可操作方式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ManipulationMode {
    Locked,
    #[serde(rename_all = "camelCase")]
    Rotatable { pivot: Point2, snap_angles: Vec<f64> },
    #[serde(rename_all = "camelCase")]
    Slidable {
        track: Segment,
        range: f64,
        snap_positions: Vec<f64>,
    },
    Free,
}

impl ManipulationMode {
    pub fn is_locked(&self) -> bool {
        matches!(self, ManipulationMode::Locked)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ManipulationMode::Locked => "locked",
            ManipulationMode::Rotatable { .. } => "rotatable",
            ManipulationMode::Slidable { .. } => "slidable",
            ManipulationMode::Free => "free",
        }
    }
}

/// 经过重叠探测裁剪后的可动范围（相对当前位置为旋转角，绝对值为滑动位置）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub min: f64,
    pub max: f64,
}

impl Limits {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// 推导拼块的操作方式
///
/// `connections` 可以是整个拼图的连接列表，只统计涉及该拼块的连接。
pub fn calculate_manipulation_mode(
    piece: &Piece,
    connections: &[Connection],
    all_pieces: &[Piece],
    is_first_piece: bool,
    config: &EngineConfig,
) -> EngineResult<ManipulationMode> {
    if is_first_piece {
        return Ok(ManipulationMode::Locked);
    }

    let own: Vec<&Connection> = connections.iter().filter(|c| c.involves(&piece.id)).collect();
    let connection = match own.as_slice() {
        [] => return Ok(ManipulationMode::Free),
        [single] => *single,
        _ => return Ok(ManipulationMode::Locked),
    };

    let resolved = ResolvedConnection::resolve(&connection.connection_type, &piece.id, all_pieces, config)?;
    match connection.connection_type {
        ConnectionType::VertexToVertex { .. } => {
            let frame = RotationFrame::from_resolved(&resolved)?;
            Ok(ManipulationMode::Rotatable {
                pivot: frame.pivot(),
                snap_angles: rotation_candidates(&config.snap),
            })
        }
        ConnectionType::EdgeToEdge { .. } | ConnectionType::VertexToEdge { .. } => {
            let frame = SlideFrame::from_resolved(&resolved)?;
            let range = frame.range();
            Ok(ManipulationMode::Slidable {
                track: frame.track(resolved.moving, config.visual_scale)?,
                range,
                snap_positions: slide_stops(range, &config.snap),
            })
        }
    }
}

/// 从当前姿态出发按旋转步长向两侧探测，遇到第一个重叠的角度即停止
///
/// 返回相对当前姿态的角度范围，最大为 `[-180, 180]`。
pub fn calculate_rotation_limits(
    piece: &Piece,
    connection: &Connection,
    all_pieces: &[Piece],
    config: &EngineConfig,
) -> EngineResult<Limits> {
    let resolved = ResolvedConnection::resolve(&connection.connection_type, &piece.id, all_pieces, config)?;
    let frame = RotationFrame::from_resolved(&resolved)?;
    let engine = TransformEngine::new(*config);
    let scale = config.visual_scale;
    let step = if config.snap.rotation_step > 0.0 {
        config.snap.rotation_step
    } else {
        45.0
    };

    let is_free = |delta: f64| {
        let candidate = piece.with_transform(frame.transform_for(piece, delta, scale));
        engine.overlapping(&candidate, all_pieces).is_empty()
    };
    let reach = |direction: f64| {
        let mut reached = 0.0;
        let mut delta = step;
        while delta <= 180.0 + 1e-9 {
            if !is_free(direction * delta) {
                break;
            }
            reached = delta;
            delta += step;
        }
        direction * reached
    };

    let limits = Limits {
        min: reach(-1.0),
        max: reach(1.0),
    };
    tracing::debug!("Rotation limits for {}: [{:.0}, {:.0}]", piece.id, limits.min, limits.max);
    Ok(limits)
}

/// 从当前位置出发按探测步长向两端探测，遇到第一个重叠的位置即停止
///
/// 返回滑动位置的绝对范围，落在 `[0, range]` 之内。
pub fn calculate_slide_limits(
    piece: &Piece,
    connection: &Connection,
    all_pieces: &[Piece],
    config: &EngineConfig,
) -> EngineResult<Limits> {
    let resolved = ResolvedConnection::resolve(&connection.connection_type, &piece.id, all_pieces, config)?;
    let frame = SlideFrame::from_resolved(&resolved)?;
    let engine = TransformEngine::new(*config);
    let scale = config.visual_scale;
    let range = frame.range();
    let step = if config.snap.slide_scan_step > 0.0 {
        config.snap.slide_scan_step
    } else {
        5.0
    };
    let current = frame.position_of(piece, scale)?.clamp(0.0, range);

    let is_free = |s: f64| -> EngineResult<bool> {
        let candidate = piece.with_transform(frame.transform_for(piece, s, scale)?);
        Ok(engine.overlapping(&candidate, all_pieces).is_empty())
    };
    let reach = |target: f64| -> EngineResult<f64> {
        let direction = if target >= current { 1.0 } else { -1.0 };
        let mut reached = current;
        loop {
            if (target - reached).abs() < 1e-9 {
                return Ok(target);
            }
            let next = if (target - reached).abs() <= step {
                target
            } else {
                reached + direction * step
            };
            if !is_free(next)? {
                return Ok(reached);
            }
            reached = next;
        }
    };

    let limits = Limits {
        min: reach(0.0)?,
        max: reach(range)?,
    };
    tracing::debug!(
        "Slide limits for {}: [{:.1}, {:.1}] of {:.1}",
        piece.id,
        limits.min,
        limits.max,
        range
    );
    Ok(limits)
}

/// 按重叠探测得到的可动范围裁剪操作方式中的捕捉集合
///
/// 锁定和自由拖动原样返回。
pub fn constrain_to_limits(
    mode: ManipulationMode,
    piece: &Piece,
    connection: &Connection,
    all_pieces: &[Piece],
    config: &EngineConfig,
) -> EngineResult<ManipulationMode> {
    match mode {
        ManipulationMode::Rotatable { pivot, snap_angles } => {
            let limits = calculate_rotation_limits(piece, connection, all_pieces, config)?;
            Ok(ManipulationMode::Rotatable {
                pivot,
                snap_angles: snap_angles.into_iter().filter(|a| limits.contains(*a)).collect(),
            })
        }
        ManipulationMode::Slidable {
            track,
            range,
            snap_positions,
        } => {
            let limits = calculate_slide_limits(piece, connection, all_pieces, config)?;
            let reachable = Limits {
                min: limits.min - 1e-9,
                max: limits.max + 1e-9,
            };
            Ok(ManipulationMode::Slidable {
                track,
                range,
                snap_positions: snap_positions.into_iter().filter(|s| reachable.contains(*s)).collect(),
            })
        }
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PieceType;
    use crate::connection::create_connection;
    use crate::math::Vector2;
    use crate::transform::Transform2D;

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    fn piece(id: &str, piece_type: PieceType, x: f64, y: f64) -> Piece {
        Piece::new(id.into(), piece_type, Transform2D::from_translation(Vector2::new(x, y)))
    }

    /// 正方形 + 顶点接在其右上角的小三角形
    fn corner_pair() -> (Vec<Piece>, Connection) {
        let pieces = vec![
            piece("sq", PieceType::Square, 400.0, 400.0),
            piece("tri", PieceType::SmallTriangle1, 450.0, 450.0),
        ];
        let ct = ConnectionType::VertexToVertex {
            piece_a: "sq".into(),
            vertex_a: 2,
            piece_b: "tri".into(),
            vertex_b: 0,
        };
        let c = create_connection(ct, &pieces, &config()).unwrap();
        (pieces, c)
    }

    /// 大三角形底边下方贴一个正方形
    fn track_pair() -> (Vec<Piece>, Connection) {
        let pieces = vec![
            piece("big", PieceType::LargeTriangle1, 400.0, 400.0),
            piece("sq", PieceType::Square, 400.0, 350.0),
        ];
        let ct = ConnectionType::EdgeToEdge {
            piece_a: "big".into(),
            edge_a: 0,
            piece_b: "sq".into(),
            edge_b: 2,
        };
        let c = create_connection(ct, &pieces, &config()).unwrap();
        (pieces, c)
    }

    #[test]
    fn test_first_and_unconnected_pieces() {
        let sq = piece("sq", PieceType::Square, 0.0, 0.0);
        assert_eq!(
            calculate_manipulation_mode(&sq, &[], &[sq.clone()], true, &config()).unwrap(),
            ManipulationMode::Locked
        );
        assert_eq!(
            calculate_manipulation_mode(&sq, &[], &[sq.clone()], false, &config()).unwrap(),
            ManipulationMode::Free
        );
    }

    #[test]
    fn test_vertex_connection_is_rotatable() {
        let (pieces, c) = corner_pair();
        let mode = calculate_manipulation_mode(&pieces[1], &[c], &pieces, false, &config()).unwrap();
        match mode {
            ManipulationMode::Rotatable { pivot, snap_angles } => {
                assert!((pivot - Point2::new(450.0, 450.0)).norm() < 1e-9);
                assert_eq!(snap_angles.len(), 9);
            }
            other => panic!("unexpected mode {:?}", other),
        }
    }

    #[test]
    fn test_edge_connection_is_slidable() {
        let (pieces, c) = track_pair();
        let mode = calculate_manipulation_mode(&pieces[1], &[c], &pieces, false, &config()).unwrap();
        match mode {
            ManipulationMode::Slidable {
                track,
                range,
                snap_positions,
            } => {
                assert!((range - 50.0).abs() < 1e-9);
                assert_eq!(snap_positions, vec![0.0, 12.5, 25.0, 37.5, 50.0]);
                assert!((track.length() - 100.0).abs() < 1e-9);
            }
            other => panic!("unexpected mode {:?}", other),
        }
    }

    #[test]
    fn test_two_connections_always_locked() {
        let (mut pieces, c1) = track_pair();
        // 第二块大三角形，直角顶点接在正方形左下角
        pieces.push(Piece::new(
            "big2".into(),
            PieceType::LargeTriangle2,
            Transform2D::new(180.0, Vector2::new(400.0, 350.0), false),
        ));
        let ct = ConnectionType::VertexToVertex {
            piece_a: "big2".into(),
            vertex_a: 0,
            piece_b: "sq".into(),
            vertex_b: 0,
        };
        let c2 = create_connection(ct, &pieces, &config()).unwrap();
        let mode = calculate_manipulation_mode(&pieces[1], &[c1, c2], &pieces, false, &config()).unwrap();
        assert_eq!(mode, ManipulationMode::Locked);
    }

    #[test]
    fn test_rotation_limits_stop_at_overlap() {
        let (pieces, c) = corner_pair();
        let limits = calculate_rotation_limits(&pieces[1], &c, &pieces, &config()).unwrap();
        assert_eq!(limits, Limits { min: -90.0, max: 90.0 });
        assert!(limits.contains(45.0));
        assert!(!limits.contains(135.0));
    }

    #[test]
    fn test_slide_limits_trimmed_by_neighbor() {
        let (mut pieces, c) = track_pair();
        let full = calculate_slide_limits(&pieces[1], &c, &pieces, &config()).unwrap();
        assert_eq!(full, Limits { min: 0.0, max: 50.0 });

        // 挡块放在轨道右下方，正方形最多滑到 25
        pieces.push(piece("block", PieceType::Square, 475.0, 350.0));
        let trimmed = calculate_slide_limits(&pieces[1], &c, &pieces, &config()).unwrap();
        assert!((trimmed.min - 0.0).abs() < 1e-9);
        assert!((trimmed.max - 25.0).abs() < 1e-9);
        assert!((trimmed.span() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_constrained_snap_sets() {
        let (pieces, c) = corner_pair();
        let mode = calculate_manipulation_mode(&pieces[1], &[c.clone()], &pieces, false, &config()).unwrap();
        match constrain_to_limits(mode, &pieces[1], &c, &pieces, &config()).unwrap() {
            ManipulationMode::Rotatable { snap_angles, .. } => {
                assert_eq!(snap_angles, vec![-90.0, -45.0, 0.0, 45.0, 90.0]);
            }
            other => panic!("unexpected mode {:?}", other),
        }

        let (mut pieces, c) = track_pair();
        pieces.push(piece("block", PieceType::Square, 475.0, 350.0));
        let mode = calculate_manipulation_mode(&pieces[1], &[c.clone()], &pieces, false, &config()).unwrap();
        match constrain_to_limits(mode, &pieces[1], &c, &pieces, &config()).unwrap() {
            ManipulationMode::Slidable {
                range, snap_positions, ..
            } => {
                assert!((range - 50.0).abs() < 1e-9);
                assert_eq!(snap_positions, vec![0.0, 12.5, 25.0]);
            }
            other => panic!("unexpected mode {:?}", other),
        }

        let free = constrain_to_limits(ManipulationMode::Free, &pieces[1], &c, &pieces, &config()).unwrap();
        assert_eq!(free, ManipulationMode::Free);
    }
}
