//! Plain-text dumps of a planner run
//!
//! One configuration per line, coordinates separated by commas. Edge files
//! hold two configurations per line: tree edges list the child then the
//! parent, robot edges list where the edge starts then where it ends.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::common::{EdgeModel, Position, RrtxResult, Trajectory};
use crate::path_planning::rrtx::Planner;

pub const ROBOT_PATH_FILE: &str = "robot_path.txt";
pub const TREE_NODES_FILE: &str = "tree_nodes.txt";
pub const TREE_EDGES_FILE: &str = "tree_edges.txt";
pub const ROBOT_EDGES_FILE: &str = "robot_edges.txt";

fn format_row(position: &Position) -> String {
    position
        .iter()
        .map(|v| format!("{:.6}", v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Write one configuration per line
pub fn write_positions<'a>(path: &Path, positions: impl IntoIterator<Item = &'a Position>) -> RrtxResult<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for position in positions {
        writeln!(out, "{}", format_row(position))?;
    }
    out.flush()?;
    Ok(())
}

/// Write rows of two configurations
pub fn write_edges(path: &Path, edges: &[(Position, Position)]) -> RrtxResult<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for (child, parent) in edges {
        writeln!(out, "{},{}", format_row(child), format_row(parent))?;
    }
    out.flush()?;
    Ok(())
}

/// Dump the robot trail, live nodes, parent edges and the edges the robot drove into `dir`
pub fn export_run<M: EdgeModel>(planner: &Planner<M>, dir: &Path) -> RrtxResult<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;

    let robot_path = dir.join(ROBOT_PATH_FILE);
    write_positions(&robot_path, planner.robot_history())?;

    let nodes = dir.join(TREE_NODES_FILE);
    write_positions(&nodes, planner.nodes().map(|(_, position, _)| position))?;

    let edges = dir.join(TREE_EDGES_FILE);
    write_edges(&edges, &planner.tree_edges())?;

    let robot_edges = dir.join(ROBOT_EDGES_FILE);
    let driven: Vec<(Position, Position)> = planner
        .traversed_edges()
        .map(|e| (e.start().clone(), e.end().clone()))
        .collect();
    write_edges(&robot_edges, &driven)?;

    Ok(vec![robot_path, nodes, edges, robot_edges])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_positions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.txt");
        let points = vec![
            Position::from_vec(vec![1.0, 2.0]),
            Position::from_vec(vec![-0.5, 3.25]),
        ];
        write_positions(&path, &points).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["1.000000,2.000000", "-0.500000,3.250000"]);
    }

    #[test]
    fn test_write_edges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edges.txt");
        let edges = vec![(Position::from_vec(vec![1.0, 0.0]), Position::from_vec(vec![0.0, 0.0]))];
        write_edges(&path, &edges).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let fields: Vec<f64> = text.trim().split(',').map(|v| v.parse().unwrap()).collect();
        assert_eq!(fields, vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_export_run_writes_all_files() {
        use crate::path_planning::rrtx::{DistanceKind, EdgeModelConfig, PlannerConfig};

        let config = PlannerConfig {
            lower_bounds: vec![-20.0, -20.0],
            upper_bounds: vec![20.0, 20.0],
            wraps: vec![],
            start: vec![10.0, 10.0],
            goal: vec![0.0, 0.0],
            distance: DistanceKind::Euclidean,
            edge_model: EdgeModelConfig::Straight,
            move_robot: false,
            total_planning_time: 0.5,
            seed: Some(3),
            ..PlannerConfig::default()
        };
        let mut planner = Planner::straight(config).unwrap();
        planner.run().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("run");
        let files = export_run(&planner, &out).unwrap();
        assert_eq!(files.len(), 4);

        let history = fs::read_to_string(out.join(ROBOT_PATH_FILE)).unwrap();
        assert_eq!(history.lines().count(), planner.robot_history().len());
        let nodes = fs::read_to_string(out.join(TREE_NODES_FILE)).unwrap();
        assert_eq!(nodes.lines().count(), planner.tree_size());
        let edges = fs::read_to_string(out.join(TREE_EDGES_FILE)).unwrap();
        assert_eq!(edges.lines().count(), planner.tree_edges().len());
        assert!(edges.lines().all(|l| l.split(',').count() == 4));
        let driven = fs::read_to_string(out.join(ROBOT_EDGES_FILE)).unwrap();
        assert_eq!(driven.lines().count(), 0);
    }

    #[test]
    fn test_export_run_lists_driven_edges() {
        use crate::path_planning::rrtx::{DistanceKind, EdgeModelConfig, PlannerConfig, Termination};

        let config = PlannerConfig {
            lower_bounds: vec![-20.0, -20.0],
            upper_bounds: vec![20.0, 20.0],
            wraps: vec![],
            start: vec![12.0, 9.0],
            goal: vec![0.0, 0.0],
            distance: DistanceKind::Euclidean,
            edge_model: EdgeModelConfig::Straight,
            planning_only_time: 0.5,
            total_planning_time: 20.0,
            p_goal: 0.1,
            samples_per_slice: 3,
            seed: Some(5),
            ..PlannerConfig::default()
        };
        let mut planner = Planner::straight(config).unwrap();
        let report = planner.run().unwrap();
        assert_eq!(report.termination, Termination::ReachedGoal);

        let dir = tempfile::tempdir().unwrap();
        export_run(&planner, dir.path()).unwrap();
        let driven = fs::read_to_string(dir.path().join(ROBOT_EDGES_FILE)).unwrap();
        let rows: Vec<Vec<f64>> = driven
            .lines()
            .map(|l| l.split(',').map(|v| v.parse().unwrap()).collect())
            .collect();
        assert_eq!(rows.len(), planner.traversed_edges().count());
        assert!(!rows.is_empty());
        assert!((rows[0][0] - 12.0).abs() < 1e-5 && (rows[0][1] - 9.0).abs() < 1e-5);
        // each driven edge starts where the previous one ended
        for pair in rows.windows(2) {
            assert!((pair[0][2] - pair[1][0]).abs() < 1e-5);
            assert!((pair[0][3] - pair[1][1]).abs() < 1e-5);
        }
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("points.txt");
        let points = vec![Position::from_vec(vec![0.0])];
        assert!(write_positions(&path, &points).is_err());
    }
}
