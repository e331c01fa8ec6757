//! 几何内核
//!
//! 针对凸多边形拼块的纯函数集合：
//! - 点/向量运算、角度
//! - 线段求交、点在线段上
//! - 点在多边形内（边界不算“包含”）
//! - 分离轴（SAT）重叠检测，以及共享顶点的“相接”重分类
//! - 共享顶点/共享边检测与接触分类
//! - 包围盒、面积（鞋带公式）
//!
//! 所有函数无状态、无副作用。

use crate::config::ToleranceConfig;
use crate::math::{cross, BoundingBox2, Point2, Vector2, EPSILON};
use crate::transform::Transform2D;
use serde::{Deserialize, Serialize};

pub use crate::math::normalize_angle;

/// 线段
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: Point2,
    pub end: Point2,
}

impl Segment {
    pub fn new(start: Point2, end: Point2) -> Self {
        Self { start, end }
    }

    /// 线段长度
    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }

    /// 单位方向向量；零长度线段返回 `None`
    pub fn direction(&self) -> Option<Vector2> {
        let v = self.end - self.start;
        let len = v.norm();
        if len < EPSILON {
            None
        } else {
            Some(v / len)
        }
    }

    /// 线段中点
    pub fn midpoint(&self) -> Point2 {
        nalgebra::center(&self.start, &self.end)
    }

    /// 线段上距离给定点最近的点
    pub fn nearest_point(&self, point: &Point2) -> Point2 {
        let v = self.end - self.start;
        let c2 = v.dot(&v);
        if c2 < EPSILON {
            return self.start;
        }
        let t = ((point - self.start).dot(&v) / c2).clamp(0.0, 1.0);
        self.start + v * t
    }

    /// 点到线段的距离
    pub fn distance_to_point(&self, point: &Point2) -> f64 {
        (point - self.nearest_point(point)).norm()
    }
}

/// 对每个顶点应用变换
pub fn transform_vertices(vertices: &[Point2], transform: &Transform2D) -> Vec<Point2> {
    vertices.iter().map(|v| transform.apply(v)).collect()
}

/// 两点距离
#[inline]
pub fn distance(a: &Point2, b: &Point2) -> f64 {
    (b - a).norm()
}

/// `vertex` 处由 `p1`、`p2` 张成的夹角（度，[0, 180]）
pub fn angle_at(vertex: &Point2, p1: &Point2, p2: &Point2) -> f64 {
    let a = p1 - vertex;
    let b = p2 - vertex;
    if a.norm() < EPSILON || b.norm() < EPSILON {
        return 0.0;
    }
    cross(&a, &b).atan2(a.dot(&b)).abs().to_degrees()
}

/// 多边形的边列表
pub fn polygon_edges(polygon: &[Point2]) -> Vec<Segment> {
    let n = polygon.len();
    (0..n)
        .map(|i| Segment::new(polygon[i], polygon[(i + 1) % n]))
        .collect()
}

/// 点是否在线段上
///
/// 先用叉积（按线段长度归一化为垂直距离）判断共线，再用点积投影判断是否落在端点之间。
pub fn point_on_segment(point: &Point2, start: &Point2, end: &Point2, tolerance: f64) -> bool {
    let seg = end - start;
    let len = seg.norm();
    if len < EPSILON {
        return distance(point, start) <= tolerance;
    }

    let w = point - start;
    if (cross(&seg, &w) / len).abs() > tolerance {
        return false;
    }

    let t = w.dot(&seg) / (len * len);
    let slack = tolerance / len;
    (-slack..=1.0 + slack).contains(&t)
}

/// 线段 p1p2 与 p3p4 的交点
///
/// 平行（分母绝对值小于容差）或交点参数不在 [0,1] 内时返回 `None`。
pub fn segment_intersection(
    p1: &Point2,
    p2: &Point2,
    p3: &Point2,
    p4: &Point2,
    tolerance: f64,
) -> Option<Point2> {
    let d1 = p2 - p1;
    let d2 = p4 - p3;
    let denom = cross(&d1, &d2);
    if denom.abs() < tolerance {
        return None;
    }

    let w = p3 - p1;
    let t = cross(&w, &d2) / denom;
    let u = cross(&w, &d1) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some(p1 + d1 * t)
    } else {
        None
    }
}

/// 点是否严格位于多边形内部
///
/// 落在顶点或边上（容差内）的点明确返回 `false`，然后才做射线奇偶测试。
pub fn polygon_contains_point(polygon: &[Point2], point: &Point2, tolerance: f64) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    if polygon.iter().any(|v| distance(v, point) <= tolerance) {
        return false;
    }
    if polygon_edges(polygon)
        .iter()
        .any(|e| point_on_segment(point, &e.start, &e.end, tolerance))
    {
        return false;
    }

    let mut inside = false;
    let n = polygon.len();
    let mut j = n - 1;
    for i in 0..n {
        let (pi, pj) = (polygon[i], polygon[j]);
        if (pi.y > point.y) != (pj.y > point.y) {
            let x = (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x;
            if point.x < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn project(polygon: &[Point2], axis: &Vector2) -> (f64, f64) {
    polygon.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
        let d = p.coords.dot(axis);
        (lo.min(d), hi.max(d))
    })
}

/// 分离轴测试
///
/// 以两个多边形所有边的法向为候选轴；投影重叠不超过 `tolerance` 即视为分离。
/// 只判断凸多边形。
pub fn polygons_overlap(a: &[Point2], b: &[Point2], tolerance: f64) -> bool {
    if a.len() < 3 || b.len() < 3 {
        return false;
    }

    for polygon in [a, b] {
        for edge in polygon_edges(polygon) {
            let Some(dir) = edge.direction() else {
                continue;
            };
            let axis = Vector2::new(-dir.y, dir.x);
            let (min_a, max_a) = project(a, &axis);
            let (min_b, max_b) = project(b, &axis);
            if max_a - min_b <= tolerance || max_b - min_a <= tolerance {
                return false;
            }
        }
    }
    true
}

/// 共享顶点：`(a 中的索引, b 中的索引)`
pub fn shared_vertices(a: &[Point2], b: &[Point2], tolerance: f64) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for (i, va) in a.iter().enumerate() {
        for (j, vb) in b.iter().enumerate() {
            if distance(va, vb) <= tolerance {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

/// 与对方某个顶点重合的顶点数（取两个方向的较小值，保证对称）
fn shared_vertex_count(a: &[Point2], b: &[Point2], tolerance: f64) -> usize {
    let count = |p: &[Point2], q: &[Point2]| {
        p.iter()
            .filter(|v| q.iter().any(|w| distance(v, w) <= tolerance))
            .count()
    };
    count(a, b).min(count(b, a))
}

/// 两条边是否（部分）重合：共线且重叠长度大于容差
pub fn edges_coincide(a: &Segment, b: &Segment, tolerance: f64) -> bool {
    let (long, short) = if a.length() >= b.length() { (a, b) } else { (b, a) };
    let Some(dir) = long.direction() else {
        return false;
    };

    let w0 = short.start - long.start;
    let w1 = short.end - long.start;
    if cross(&dir, &w0).abs() > tolerance || cross(&dir, &w1).abs() > tolerance {
        return false;
    }

    let (t0, t1) = (w0.dot(&dir), w1.dot(&dir));
    let overlap = t0.max(t1).min(long.length()) - t0.min(t1).max(0.0);
    overlap > tolerance
}

/// 共享边：`(a 中的边索引, b 中的边索引)`
pub fn shared_edges(a: &[Point2], b: &[Point2], tolerance: f64) -> Vec<(usize, usize)> {
    let edges_a = polygon_edges(a);
    let edges_b = polygon_edges(b);
    let mut pairs = Vec::new();
    for (i, ea) in edges_a.iter().enumerate() {
        for (j, eb) in edges_b.iter().enumerate() {
            if edges_coincide(ea, eb, tolerance) {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

/// 质心（顶点均值）
pub fn centroid(points: &[Point2]) -> Point2 {
    if points.is_empty() {
        return Point2::origin();
    }
    let sum = points.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords);
    Point2::from(sum / points.len() as f64)
}

/// 真正的内部穿透：一方的顶点/边中点/质心严格落在另一方内部，或两条边在端点以外交叉
fn has_penetration(a: &[Point2], b: &[Point2], tolerance: f64) -> bool {
    let sample_points = |p: &[Point2]| {
        let mut pts: Vec<Point2> = p.to_vec();
        pts.extend(polygon_edges(p).iter().map(Segment::midpoint));
        pts.push(centroid(p));
        pts
    };

    if sample_points(a).iter().any(|p| polygon_contains_point(b, p, tolerance))
        || sample_points(b).iter().any(|p| polygon_contains_point(a, p, tolerance))
    {
        return true;
    }

    for ea in polygon_edges(a) {
        for eb in polygon_edges(b) {
            if let Some(x) = segment_intersection(&ea.start, &ea.end, &eb.start, &eb.end, EPSILON) {
                let near_endpoint = [ea.start, ea.end, eb.start, eb.end]
                    .iter()
                    .any(|e| distance(e, &x) <= tolerance);
                if !near_endpoint {
                    return true;
                }
            }
        }
    }
    false
}

/// 面积重叠判定（系统中最关键的谓词）
///
/// 1. SAT 找到分离轴（含容差）即不重叠；
/// 2. 共享 3 个及以上顶点视为重叠；
/// 3. 共享 1~2 个顶点且没有真正的内部穿透时，重分类为“相接”。
pub fn has_area_overlap(a: &[Point2], b: &[Point2], tolerance: &ToleranceConfig) -> bool {
    if !polygons_overlap(a, b, tolerance.overlap) {
        return false;
    }

    match shared_vertex_count(a, b, tolerance.vertex) {
        0 => true,
        1 | 2 => has_penetration(a, b, tolerance.vertex),
        _ => true,
    }
}

/// 一方的顶点落在另一方的边上
fn has_vertex_on_edge(a: &[Point2], b: &[Point2], tolerance: f64) -> bool {
    let touches = |p: &[Point2], q: &[Point2]| {
        p.iter().any(|v| {
            polygon_edges(q)
                .iter()
                .any(|e| point_on_segment(v, &e.start, &e.end, tolerance))
        })
    };
    touches(a, b) || touches(b, a)
}

/// 两块之间的接触类型（按优先级从高到低）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ContactType {
    NoContact,
    VertexContact,
    EdgeContact,
    AreaOverlap,
}

/// 接触分类：面积重叠 > 边接触 > 顶点接触 > 无接触
pub fn classify_contact(a: &[Point2], b: &[Point2], tolerance: &ToleranceConfig) -> ContactType {
    if has_area_overlap(a, b, tolerance) {
        ContactType::AreaOverlap
    } else if !shared_edges(a, b, tolerance.edge).is_empty() {
        ContactType::EdgeContact
    } else if !shared_vertices(a, b, tolerance.vertex).is_empty()
        || has_vertex_on_edge(a, b, tolerance.edge)
    {
        ContactType::VertexContact
    } else {
        ContactType::NoContact
    }
}

/// 包围盒
pub fn bounding_box(points: &[Point2]) -> BoundingBox2 {
    BoundingBox2::from_points(points.iter().copied())
}

/// 有向面积（逆时针为正）
pub fn signed_polygon_area(polygon: &[Point2]) -> f64 {
    let n = polygon.len();
    if n < 3 {
        return 0.0;
    }
    let twice: f64 = (0..n)
        .map(|i| {
            let (p, q) = (polygon[i], polygon[(i + 1) % n]);
            p.x * q.y - q.x * p.y
        })
        .sum();
    twice / 2.0
}

/// 面积（鞋带公式）
pub fn polygon_area(polygon: &[Point2]) -> f64 {
    signed_polygon_area(polygon).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64, size: f64) -> Vec<Point2> {
        vec![
            Point2::new(x, y),
            Point2::new(x + size, y),
            Point2::new(x + size, y + size),
            Point2::new(x, y + size),
        ]
    }

    fn tol() -> ToleranceConfig {
        ToleranceConfig::default()
    }

    #[test]
    fn test_point_on_segment() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(100.0, 0.0);
        assert!(point_on_segment(&Point2::new(50.0, 0.5), &a, &b, 1.0));
        assert!(point_on_segment(&Point2::new(100.5, 0.0), &a, &b, 1.0));
        assert!(!point_on_segment(&Point2::new(50.0, 2.0), &a, &b, 1.0));
        assert!(!point_on_segment(&Point2::new(102.0, 0.0), &a, &b, 1.0));
    }

    #[test]
    fn test_segment_intersection() {
        let p = segment_intersection(
            &Point2::new(0.0, 0.0),
            &Point2::new(10.0, 10.0),
            &Point2::new(0.0, 10.0),
            &Point2::new(10.0, 0.0),
            EPSILON,
        )
        .unwrap();
        assert!((p - Point2::new(5.0, 5.0)).norm() < 1e-9);

        // 平行
        assert!(segment_intersection(
            &Point2::new(0.0, 0.0),
            &Point2::new(10.0, 0.0),
            &Point2::new(0.0, 1.0),
            &Point2::new(10.0, 1.0),
            EPSILON,
        )
        .is_none());

        // 延长线相交但线段不相交
        assert!(segment_intersection(
            &Point2::new(0.0, 0.0),
            &Point2::new(1.0, 1.0),
            &Point2::new(0.0, 10.0),
            &Point2::new(10.0, 0.0),
            EPSILON,
        )
        .is_none());
    }

    #[test]
    fn test_contains_excludes_boundary() {
        let sq = square(0.0, 0.0, 10.0);
        assert!(polygon_contains_point(&sq, &Point2::new(5.0, 5.0), 0.01));
        assert!(!polygon_contains_point(&sq, &Point2::new(0.0, 0.0), 0.01));
        assert!(!polygon_contains_point(&sq, &Point2::new(5.0, 0.0), 0.01));
        assert!(!polygon_contains_point(&sq, &Point2::new(15.0, 5.0), 0.01));
    }

    #[test]
    fn test_angle_at() {
        let v = Point2::origin();
        assert!((angle_at(&v, &Point2::new(1.0, 0.0), &Point2::new(0.0, 1.0)) - 90.0).abs() < 1e-9);
        assert!((angle_at(&v, &Point2::new(1.0, 0.0), &Point2::new(-1.0, 1.0)) - 135.0).abs() < 1e-9);
    }

    #[test]
    fn test_area_and_bbox() {
        let sq = square(2.0, 3.0, 4.0);
        assert_eq!(polygon_area(&sq), 16.0);
        let reversed: Vec<Point2> = sq.iter().rev().copied().collect();
        assert_eq!(signed_polygon_area(&reversed), -16.0);
        let bbox = bounding_box(&sq);
        assert_eq!(bbox.min, Point2::new(2.0, 3.0));
        assert_eq!(bbox.max, Point2::new(6.0, 7.0));
    }

    #[test]
    fn test_overlap_detected() {
        let a = square(0.0, 0.0, 50.0);
        let b = square(25.0, 25.0, 50.0);
        assert!(has_area_overlap(&a, &b, &tol()));
        assert!(has_area_overlap(&b, &a, &tol()));
        assert_eq!(classify_contact(&a, &b, &tol()), ContactType::AreaOverlap);
    }

    #[test]
    fn test_shared_edge_is_not_overlap() {
        let a = square(0.0, 0.0, 50.0);
        let b = square(50.0, 0.0, 50.0);
        assert!(!has_area_overlap(&a, &b, &tol()));
        assert_eq!(shared_edges(&a, &b, 1.0), vec![(1, 3)]);
        assert_eq!(classify_contact(&a, &b, &tol()), ContactType::EdgeContact);
    }

    #[test]
    fn test_single_shared_vertex_is_touch() {
        let a = square(0.0, 0.0, 50.0);
        let b = square(50.0, 50.0, 50.0);
        assert!(!has_area_overlap(&a, &b, &tol()));
        assert_eq!(classify_contact(&a, &b, &tol()), ContactType::VertexContact);
    }

    #[test]
    fn test_drifted_shared_vertices_reclassified_as_touch() {
        // 两个正方形共享一条边但有 0.5 单位的数值漂移，SAT 判为重叠
        let a = square(0.0, 0.0, 50.0);
        let b = square(49.5, 0.0, 50.0);
        assert!(polygons_overlap(&a, &b, 0.1));
        assert!(!has_area_overlap(&a, &b, &tol()));
        assert!(!has_area_overlap(&b, &a, &tol()));
    }

    #[test]
    fn test_two_shared_vertices_with_penetration_is_overlap() {
        // 小三角形的斜边贴在大正方形的底边上，但顶点伸进正方形内部
        let sq = square(0.0, 0.0, 100.0);
        let tri = vec![
            Point2::new(0.0, 0.0),
            Point2::new(100.0, 0.0),
            Point2::new(50.0, 50.0),
        ];
        assert!(has_area_overlap(&sq, &tri, &tol()));
        assert!(has_area_overlap(&tri, &sq, &tol()));
    }

    #[test]
    fn test_identical_pieces_overlap() {
        let a = square(0.0, 0.0, 50.0);
        assert!(has_area_overlap(&a, &a.clone(), &tol()));
    }

    #[test]
    fn test_edges_partially_coincide() {
        let long = Segment::new(Point2::new(0.0, 0.0), Point2::new(100.0, 0.0));
        let short = Segment::new(Point2::new(80.0, 0.0), Point2::new(120.0, 0.0));
        assert!(edges_coincide(&long, &short, 1.0));
        assert!(edges_coincide(&short, &long, 1.0));

        let apart = Segment::new(Point2::new(101.0, 0.0), Point2::new(150.0, 0.0));
        assert!(!edges_coincide(&long, &apart, 1.0));

        let offset = Segment::new(Point2::new(10.0, 5.0), Point2::new(50.0, 5.0));
        assert!(!edges_coincide(&long, &offset, 1.0));
    }

    #[test]
    fn test_overlap_symmetry_across_offsets() {
        let a = vec![
            Point2::new(0.0, 0.0),
            Point2::new(100.0, 0.0),
            Point2::new(0.0, 100.0),
        ];
        for dx in [-60.0, -25.0, 0.0, 30.0, 50.0, 100.0, 150.0] {
            for dy in [-50.0, 0.0, 20.0, 100.0] {
                let b = square(dx, dy, 50.0);
                assert_eq!(
                    has_area_overlap(&a, &b, &tol()),
                    has_area_overlap(&b, &a, &tol()),
                    "dx={} dy={}",
                    dx,
                    dy
                );
            }
        }
    }

    #[test]
    fn test_transform_vertices() {
        let t = Transform2D::new(90.0, Vector2::new(10.0, 10.0), false);
        let out = transform_vertices(&[Point2::new(1.0, 0.0)], &t);
        assert!((out[0] - Point2::new(10.0, 11.0)).norm() < 1e-9);
    }
}
