//! Boundary geometry helpers: `GeoJSON` conversion, envelopes, and area.
//!
//! Area is the geodesic area on the WGS84 ellipsoid (Karney's algorithm).
//! Rings are re-oriented before measuring, so source winding order does
//! not affect the result.

use crime_districts_region_models::SQUARE_METRES_PER_HECTARE;
use geo::orient::Direction;
use geo::{BoundingRect as _, GeodesicArea as _, MultiPolygon, Orient as _};
use rstar::AABB;

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`].
///
/// Handles both `Polygon` and `MultiPolygon` geometry types; anything else
/// is rejected with a description of what was found.
pub fn to_multipolygon(geometry: geojson::Geometry) -> Result<MultiPolygon<f64>, String> {
    let geo_geom: geo::Geometry<f64> = geometry
        .try_into()
        .map_err(|e: geojson::Error| format!("unconvertible geometry: {e}"))?;

    let multi_polygon = match geo_geom {
        geo::Geometry::MultiPolygon(mp) => mp,
        geo::Geometry::Polygon(p) => MultiPolygon(vec![p]),
        other => {
            return Err(format!(
                "expected Polygon or MultiPolygon, found {}",
                geometry_kind(&other)
            ));
        }
    };

    validate(&multi_polygon)?;
    Ok(multi_polygon)
}

/// Rejects empty multipolygons and degenerate rings.
pub fn validate(mp: &MultiPolygon<f64>) -> Result<(), String> {
    if mp.0.is_empty() {
        return Err("geometry has no polygons".to_string());
    }
    for (i, polygon) in mp.0.iter().enumerate() {
        // Rings are closed on construction, so a triangle has 4 positions.
        if polygon.exterior().0.len() < 4 {
            return Err(format!(
                "polygon {i} exterior ring has fewer than 3 distinct positions"
            ));
        }
        let out_of_range = polygon
            .exterior()
            .coords()
            .chain(polygon.interiors().iter().flat_map(|ring| ring.coords()))
            .any(|c| !(-180.0..=180.0).contains(&c.x) || !(-90.0..=90.0).contains(&c.y));
        if out_of_range {
            return Err(format!(
                "polygon {i} has positions outside longitude/latitude range"
            ));
        }
    }
    Ok(())
}

/// Geodesic area of a [`MultiPolygon`] in hectares. Holes are subtracted.
///
/// Exteriors are wound counter-clockwise and holes clockwise first;
/// measuring a clockwise exterior as-is yields the rest of the globe.
#[must_use]
pub fn area_hectares(mp: &MultiPolygon<f64>) -> f64 {
    mp.orient(Direction::Default).geodesic_area_unsigned() / SQUARE_METRES_PER_HECTARE
}

/// R-tree envelope of a [`MultiPolygon`], `None` when it has no positions.
#[must_use]
pub fn envelope(mp: &MultiPolygon<f64>) -> Option<AABB<[f64; 2]>> {
    mp.bounding_rect()
        .map(|rect| AABB::from_corners(rect.min().into(), rect.max().into()))
}

const fn geometry_kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Polygon, polygon};

    /// A square of `side` degrees anchored at (`lon`, `lat`).
    fn square(lon: f64, lat: f64, side: f64) -> Polygon<f64> {
        polygon![
            (x: lon, y: lat),
            (x: lon + side, y: lat),
            (x: lon + side, y: lat + side),
            (x: lon, y: lat + side),
            (x: lon, y: lat),
        ]
    }

    #[test]
    fn area_of_small_square_near_chicago_is_plausible() {
        // 0.01 deg x 0.01 deg at 41.8N is roughly 1.11 km x 0.83 km.
        let mp = MultiPolygon(vec![square(-87.65, 41.85, 0.01)]);
        let ha = area_hectares(&mp);
        assert!((85.0..100.0).contains(&ha), "unexpected area {ha} ha");
    }

    #[test]
    fn holes_reduce_area() {
        let outer = square(-87.70, 41.80, 0.02);
        let hole = square(-87.695, 41.805, 0.005);
        let with_hole = Polygon::new(outer.exterior().clone(), vec![hole.exterior().clone()]);

        let solid = area_hectares(&MultiPolygon(vec![outer]));
        let holed = area_hectares(&MultiPolygon(vec![with_hole]));
        assert!(holed < solid, "hole should reduce area: {holed} >= {solid}");
    }

    #[test]
    fn winding_order_does_not_change_area() {
        let ccw = square(-87.65, 41.85, 0.01);
        let mut reversed: Vec<_> = ccw.exterior().0.clone();
        reversed.reverse();
        let cw = Polygon::new(LineString(reversed), vec![]);

        let a = area_hectares(&MultiPolygon(vec![ccw]));
        let b = area_hectares(&MultiPolygon(vec![cw]));
        assert!((a - b).abs() < 1e-6, "{a} vs {b}");
    }

    #[test]
    fn clockwise_hole_and_counter_clockwise_hole_agree() {
        let outer = square(-87.70, 41.80, 0.02);
        let hole = square(-87.695, 41.805, 0.005);
        let mut hole_cw = hole.exterior().0.clone();
        hole_cw.reverse();

        let a = Polygon::new(outer.exterior().clone(), vec![hole.exterior().clone()]);
        let b = Polygon::new(outer.exterior().clone(), vec![LineString(hole_cw)]);

        let a = area_hectares(&MultiPolygon(vec![a]));
        let b = area_hectares(&MultiPolygon(vec![b]));
        assert!((a - b).abs() < 1e-6, "{a} vs {b}");
    }

    #[test]
    fn empty_multipolygon_has_no_envelope() {
        assert!(envelope(&MultiPolygon::<f64>(vec![])).is_none());
    }

    #[test]
    fn point_geometry_is_rejected() {
        let geometry = geojson::Geometry::new(geojson::Value::Point(vec![-87.6, 41.8]));
        let err = to_multipolygon(geometry).expect_err("points are not boundaries");
        assert!(err.contains("Point"), "unexpected message: {err}");
    }

    #[test]
    fn degenerate_ring_is_rejected() {
        let geometry = geojson::Geometry::new(geojson::Value::Polygon(vec![vec![
            vec![-87.6, 41.8],
            vec![-87.5, 41.8],
            vec![-87.6, 41.8],
        ]]));
        assert!(to_multipolygon(geometry).is_err());
    }

    #[test]
    fn envelope_spans_all_parts() {
        let mp = MultiPolygon(vec![square(-87.7, 41.8, 0.01), square(-87.5, 41.9, 0.01)]);
        let env = envelope(&mp).unwrap();
        assert!((env.lower()[0] - -87.7).abs() < 1e-12);
        assert!((env.upper()[1] - 41.91).abs() < 1e-12);
    }
}
