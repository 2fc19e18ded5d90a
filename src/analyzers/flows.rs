//! Flow statistics read off a window's movement matrix.

use ndarray::{Array2, ArrayView1, Axis};
use tracing::debug;

use crate::analyzers::aggregate::{Aggregator, Stage, WindowContext};
use crate::analyzers::network::od_modularity;
use crate::analyzers::od::MatrixStore;
use crate::analyzers::types::{KeyColumn, MetricsRow};
use crate::analyzers::utility::mean;
use crate::error::Result;
use crate::geometry::Zones;

/// Share of a zone's flow a partner needs to count as meaningful.
pub const MEANINGFUL_SHARE: f64 = 0.05;

/// Which side of the matrix a zone's flows are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Column `i`: trips arriving in zone `i + 1`.
    Incoming,
    /// Row `i`: trips leaving zone `i + 1`.
    Outgoing,
}

fn lane(matrix: &Array2<f64>, zone: usize, direction: Direction) -> ArrayView1<'_, f64> {
    match direction {
        Direction::Incoming => matrix.column(zone),
        Direction::Outgoing => matrix.row(zone),
    }
}

/// Mean over zones with any flow of the number of partners holding at least
/// [`MEANINGFUL_SHARE`] of it. NaN when no zone has flow.
pub fn meaningful_connections(matrix: &Array2<f64>, direction: Direction) -> f64 {
    let counts: Vec<f64> = (0..matrix.nrows())
        .filter_map(|zone| {
            let flows = lane(matrix, zone, direction);
            let total = flows.sum();
            if total == 0.0 {
                return None;
            }
            Some(flows.iter().filter(|w| *w / total >= MEANINGFUL_SHARE).count() as f64)
        })
        .collect();
    mean(&counts)
}

/// Mean over zones with any flow of the mean distance to the zone's
/// strongest partner(s), in metres. NaN when no zone has flow.
pub fn mean_distance_to_strongest(matrix: &Array2<f64>, zones: &Zones, direction: Direction) -> f64 {
    let per_zone: Vec<f64> = (0..matrix.nrows())
        .filter_map(|zone| {
            let flows = lane(matrix, zone, direction);
            if flows.sum() == 0.0 {
                return None;
            }
            let strongest = flows.iter().copied().fold(f64::MIN, f64::max);
            let distances: Vec<f64> = flows
                .iter()
                .enumerate()
                .filter(|(_, w)| **w == strongest)
                .filter_map(|(partner, _)| zones.distance_m(zone as u32 + 1, partner as u32 + 1))
                .collect();
            (!distances.is_empty()).then(|| mean(&distances))
        })
        .collect();
    mean(&per_zone)
}

/// All flow columns for one window. The diagonal is cleared first.
pub fn flow_metrics(key: &str, matrix: &Array2<f64>, zones: &Zones) -> MetricsRow {
    let mut mm = matrix.clone();
    mm.diag_mut().fill(0.0);

    let mut row = MetricsRow::new(key);
    row.number("no_real_movements", mm.sum());

    let modularity = od_modularity(&mm).unwrap_or_else(|e| {
        debug!(key, error = %e, "Modularity undefined");
        f64::NAN
    });
    row.number("graph_modularity", modularity);

    for (i, total) in mm.sum_axis(Axis(0)).iter().enumerate() {
        row.number(format!("inflow_{}_barrio", i + 1), *total);
    }
    for (i, total) in mm.sum_axis(Axis(1)).iter().enumerate() {
        row.number(format!("outflow_{}_barrio", i + 1), *total);
    }

    row.number(
        "number_meaningful_incoming",
        meaningful_connections(&mm, Direction::Incoming),
    );
    row.number(
        "number_meaningful_outgoing",
        meaningful_connections(&mm, Direction::Outgoing),
    );
    row.number(
        "mean_distance_strongest_inflow",
        mean_distance_to_strongest(&mm, zones, Direction::Incoming),
    );
    row.number(
        "mean_distance_strongest_outflow",
        mean_distance_to_strongest(&mm, zones, Direction::Outgoing),
    );
    row
}

/// Reads each window's matrix back and records its flow statistics.
pub struct FlowStage<'a> {
    pub zones: &'a Zones,
}

impl Aggregator for FlowStage<'_> {
    fn stage(&self) -> Stage {
        Stage::Flows
    }

    fn key_column(&self) -> KeyColumn {
        KeyColumn::StartDate
    }

    fn compute(
        &mut self,
        window: &WindowContext<'_>,
        matrices: &mut MatrixStore,
    ) -> Result<Option<MetricsRow>> {
        let matrix = matrices.load(&window.matrix_key)?;
        Ok(Some(flow_metrics(&window.start_key, &matrix, self.zones)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::parse_geometry_wkt;

    fn zones() -> Zones {
        Zones::from_geometries((1..=3).map(|c| {
            let x = f64::from(c);
            (c, parse_geometry_wkt(&format!("POINT ({x} 0)")).unwrap())
        }))
        .unwrap()
    }

    fn matrix() -> Array2<f64> {
        let mut mm = Array2::<f64>::zeros((3, 3));
        mm[[0, 1]] = 19.0;
        mm[[0, 2]] = 1.0;
        mm[[2, 1]] = 5.0;
        mm[[1, 1]] = 7.0;
        mm
    }

    #[test]
    fn test_flows_and_totals() {
        let row = flow_metrics("20200406", &matrix(), &zones());
        assert_eq!(row.key, "20200406");
        assert_eq!(row.get_f64("no_real_movements"), Some(25.0));
        assert_eq!(row.get_f64("outflow_1_barrio"), Some(20.0));
        assert_eq!(row.get_f64("inflow_2_barrio"), Some(24.0));
        assert_eq!(row.get_f64("inflow_1_barrio"), Some(0.0));
        assert!(row.get_f64("graph_modularity").unwrap().is_finite());
    }

    #[test]
    fn test_meaningful_incoming_reads_columns() {
        let mut mm = matrix();
        mm.diag_mut().fill(0.0);
        // outgoing: zone 1 -> {2: 0.95, 3: 0.05}, zone 3 -> {2: 1.0}
        assert_eq!(meaningful_connections(&mm, Direction::Outgoing), 1.5);
        // incoming: zone 2 <- {1: 19/24, 3: 5/24}, zone 3 <- {1}
        assert_eq!(meaningful_connections(&mm, Direction::Incoming), 1.5);
        assert!(meaningful_connections(&Array2::zeros((3, 3)), Direction::Incoming).is_nan());
    }

    #[test]
    fn test_distance_to_strongest_partner() {
        let mut mm = matrix();
        mm.diag_mut().fill(0.0);
        let z = zones();
        let one_step = z.distance_m(1, 2).unwrap();
        let two_steps = z.distance_m(1, 3).unwrap();

        // zone 1 -> 2, zone 3 -> 2
        let out = mean_distance_to_strongest(&mm, &z, Direction::Outgoing);
        assert!((out - one_step).abs() < 1e-9);

        // zone 2 <- 1, zone 3 <- 1
        let inc = mean_distance_to_strongest(&mm, &z, Direction::Incoming);
        assert!((inc - (one_step + two_steps) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_strongest_distances_in_metres() {
        let mut mm = matrix();
        mm.diag_mut().fill(0.0);
        let row = flow_metrics("20200406", &mm, &zones());
        let km = crate::geometry::haversine_km(zones().point(1).unwrap(), zones().point(2).unwrap());
        let out = row.get_f64("mean_distance_strongest_outflow").unwrap();
        assert!((out - km * 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_matrix_gives_nan_modularity() {
        let row = flow_metrics("20200406", &Array2::zeros((3, 3)), &zones());
        assert_eq!(row.get_f64("no_real_movements"), Some(0.0));
        assert!(row.get_f64("graph_modularity").unwrap().is_nan());
        assert!(row.get_f64("mean_distance_strongest_inflow").unwrap().is_nan());
    }
}
