//! Visualization utilities for rust_rrtx
//!
//! Layers are collected first and rendered into a single gnuplot axes when
//! the figure is shown or saved.

use std::f64::consts::PI;
use std::path::Path;

use gnuplot::{AutoOption, AxesCommon, Caption, Color, Figure, LineWidth, PointSize, PointSymbol};

use crate::common::{EdgeModel, Point2D, Position, RrtxError, RrtxResult};
use crate::path_planning::rrtx::{CircleObstacle, Planner};

/// Color palette for consistent styling
pub mod colors {
    pub const BLACK: &str = "#000000";
    pub const RED: &str = "#FF0000";
    pub const GREEN: &str = "#00FF00";
    pub const BLUE: &str = "#0000FF";
    pub const CYAN: &str = "#00FFFF";
    pub const GRAY: &str = "#808080";
    pub const LIGHT_GRAY: &str = "#C8C8C8";

    // Semantic colors
    pub const OBSTACLE: &str = BLACK;
    pub const START: &str = GREEN;
    pub const GOAL: &str = BLUE;
    pub const PATH: &str = RED;
    pub const ROBOT: &str = CYAN;
    pub const TREE: &str = LIGHT_GRAY;
    pub const PLAN: &str = "#35C788";
}

/// Style for path rendering
#[derive(Debug, Clone)]
pub struct PathStyle {
    pub color: String,
    pub line_width: f64,
    pub caption: String,
}

impl PathStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            color: color.to_string(),
            line_width: 2.0,
            caption: caption.to_string(),
        }
    }

    pub fn with_line_width(mut self, width: f64) -> Self {
        self.line_width = width;
        self
    }
}

impl Default for PathStyle {
    fn default() -> Self {
        Self {
            color: colors::PATH.to_string(),
            line_width: 2.0,
            caption: "Path".to_string(),
        }
    }
}

/// Style for point rendering
#[derive(Debug, Clone)]
pub struct PointStyle {
    pub color: String,
    pub size: f64,
    pub symbol: char,
    pub caption: String,
}

impl PointStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            color: color.to_string(),
            size: 1.0,
            symbol: 'O',
            caption: caption.to_string(),
        }
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    pub fn with_symbol(mut self, symbol: char) -> Self {
        self.symbol = symbol;
        self
    }
}

#[derive(Debug, Clone)]
enum Layer {
    Lines { x: Vec<f64>, y: Vec<f64>, style: PathStyle },
    Points { x: Vec<f64>, y: Vec<f64>, style: PointStyle },
}

/// Main visualizer struct
pub struct Visualizer {
    layers: Vec<Layer>,
    title: String,
    x_label: String,
    y_label: String,
    x_range: Option<(f64, f64)>,
    y_range: Option<(f64, f64)>,
    aspect_ratio: Option<f64>,
}

impl Visualizer {
    /// Create a new visualizer
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            title: String::new(),
            x_label: "X [m]".to_string(),
            y_label: "Y [m]".to_string(),
            x_range: None,
            y_range: None,
            aspect_ratio: Some(1.0),
        }
    }

    pub fn set_title(&mut self, title: &str) -> &mut Self {
        self.title = title.to_string();
        self
    }

    pub fn set_x_label(&mut self, label: &str) -> &mut Self {
        self.x_label = label.to_string();
        self
    }

    pub fn set_y_label(&mut self, label: &str) -> &mut Self {
        self.y_label = label.to_string();
        self
    }

    pub fn set_x_range(&mut self, min: f64, max: f64) -> &mut Self {
        self.x_range = Some((min, max));
        self
    }

    pub fn set_y_range(&mut self, min: f64, max: f64) -> &mut Self {
        self.y_range = Some((min, max));
        self
    }

    /// Set aspect ratio (None for auto)
    pub fn set_aspect_ratio(&mut self, ratio: Option<f64>) -> &mut Self {
        self.aspect_ratio = ratio;
        self
    }

    /// Number of queued layers
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Plot the planar projection of a sequence of configurations
    pub fn plot_path(&mut self, path: &[Position], style: &PathStyle) -> &mut Self {
        let points: Vec<Point2D> = path.iter().map(Point2D::from_position).collect();
        let x = points.iter().map(|p| p.x).collect();
        let y = points.iter().map(|p| p.y).collect();
        self.layers.push(Layer::Lines { x, y, style: style.clone() });
        self
    }

    /// Plot the parent edges of the search graph as straight chords
    pub fn plot_tree(&mut self, edges: &[(Position, Position)]) -> &mut Self {
        for (i, (child, parent)) in edges.iter().enumerate() {
            let a = Point2D::from_position(child);
            let b = Point2D::from_position(parent);
            // caption only once so the legend stays short
            let caption = if i == 0 { "Tree" } else { "" };
            self.layers.push(Layer::Lines {
                x: vec![a.x, b.x],
                y: vec![a.y, b.y],
                style: PathStyle::new(colors::TREE, caption).with_line_width(0.5),
            });
        }
        self
    }

    /// Plot circular obstacles as closed outlines
    pub fn plot_obstacles<'a>(&mut self, obstacles: impl IntoIterator<Item = &'a CircleObstacle>) -> &mut Self {
        for (i, obstacle) in obstacles.into_iter().enumerate() {
            let (x, y) = circle_outline(obstacle, 36);
            let caption = if i == 0 { "Obstacles" } else { "" };
            self.layers.push(Layer::Lines {
                x,
                y,
                style: PathStyle::new(colors::OBSTACLE, caption).with_line_width(1.5),
            });
        }
        self
    }

    /// Plot a single point (start, goal, etc.)
    pub fn plot_point(&mut self, point: Point2D, style: &PointStyle) -> &mut Self {
        self.layers.push(Layer::Points {
            x: vec![point.x],
            y: vec![point.y],
            style: style.clone(),
        });
        self
    }

    pub fn plot_points(&mut self, points: &[Point2D], style: &PointStyle) -> &mut Self {
        self.layers.push(Layer::Points {
            x: points.iter().map(|p| p.x).collect(),
            y: points.iter().map(|p| p.y).collect(),
            style: style.clone(),
        });
        self
    }

    pub fn plot_start(&mut self, point: Point2D) -> &mut Self {
        self.plot_point(point, &PointStyle::new(colors::START, "Start").with_size(1.5))
    }

    pub fn plot_goal(&mut self, point: Point2D) -> &mut Self {
        self.plot_point(point, &PointStyle::new(colors::GOAL, "Goal").with_size(1.5))
    }

    /// Finalize and show the plot
    pub fn show(&self) -> RrtxResult<()> {
        let mut figure = self.render();
        figure
            .show()
            .map(|_| ())
            .map_err(|e| RrtxError::Visualization(e.to_string()))
    }

    /// Save plot to PNG file
    pub fn save_png(&self, path: &Path, width: u32, height: u32) -> RrtxResult<()> {
        let mut figure = self.render();
        figure
            .save_to_png(path, width, height)
            .map_err(|e| RrtxError::Visualization(e.to_string()))
    }

    /// Save plot to SVG file
    pub fn save_svg(&self, path: &Path) -> RrtxResult<()> {
        let mut figure = self.render();
        figure
            .save_to_svg(path, 800, 600)
            .map_err(|e| RrtxError::Visualization(e.to_string()))
    }

    fn render(&self) -> Figure {
        let mut figure = Figure::new();
        let axes = figure.axes2d();

        for layer in &self.layers {
            match layer {
                Layer::Lines { x, y, style } => {
                    axes.lines(
                        x,
                        y,
                        &[
                            Caption(style.caption.as_str()),
                            Color(style.color.as_str()),
                            LineWidth(style.line_width),
                        ],
                    );
                }
                Layer::Points { x, y, style } => {
                    axes.points(
                        x,
                        y,
                        &[
                            Caption(style.caption.as_str()),
                            Color(style.color.as_str()),
                            PointSymbol(style.symbol),
                            PointSize(style.size),
                        ],
                    );
                }
            }
        }

        if !self.title.is_empty() {
            axes.set_title(&self.title, &[]);
        }
        axes.set_x_label(&self.x_label, &[]);
        axes.set_y_label(&self.y_label, &[]);

        if let Some((min, max)) = self.x_range {
            axes.set_x_range(AutoOption::Fix(min), AutoOption::Fix(max));
        }
        if let Some((min, max)) = self.y_range {
            axes.set_y_range(AutoOption::Fix(min), AutoOption::Fix(max));
        }
        if let Some(ratio) = self.aspect_ratio {
            axes.set_aspect_ratio(AutoOption::Fix(ratio));
        }
        figure
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}

fn circle_outline(obstacle: &CircleObstacle, segments: usize) -> (Vec<f64>, Vec<f64>) {
    (0..=segments)
        .map(|i| {
            let t = 2.0 * PI * i as f64 / segments as f64;
            (obstacle.x + obstacle.radius * t.cos(), obstacle.y + obstacle.radius * t.sin())
        })
        .unzip()
}

/// Snapshot of a planner: tree, obstacles, robot trail, current plan, start and goal
pub fn plot_planner<M: EdgeModel>(planner: &Planner<M>, title: &str) -> Visualizer {
    let mut vis = Visualizer::new();
    vis.set_title(title);

    let space = planner.space();
    vis.set_x_range(space.lower_bounds()[0], space.upper_bounds()[0]);
    if space.dims() > 1 {
        vis.set_y_range(space.lower_bounds()[1], space.upper_bounds()[1]);
    }

    vis.plot_tree(&planner.tree_edges())
        .plot_obstacles(planner.obstacles().iter().map(|(_, o)| o))
        .plot_path(&planner.current_path(), &PathStyle::new(colors::PLAN, "Plan"))
        .plot_path(planner.robot_history(), &PathStyle::new(colors::PATH, "Robot"))
        .plot_start(Point2D::from_position(space.start()))
        .plot_goal(Point2D::from_position(space.goal()));
    vis
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visualizer_creation() {
        let vis = Visualizer::new();
        assert!(vis.aspect_ratio.is_some());
        assert_eq!(vis.layer_count(), 0);
    }

    #[test]
    fn test_path_style() {
        let style = PathStyle::new(colors::RED, "Test Path").with_line_width(3.0);
        assert_eq!(style.line_width, 3.0);
        assert_eq!(style.color, colors::RED);
    }

    #[test]
    fn test_circle_outline_is_closed() {
        let obstacle = CircleObstacle::new(1.0, 2.0, 3.0);
        let (x, y) = circle_outline(&obstacle, 12);
        assert_eq!(x.len(), 13);
        assert!((x[0] - x[12]).abs() < 1e-9);
        assert!((y[0] - y[12]).abs() < 1e-9);
        for (px, py) in x.iter().zip(&y) {
            let r = ((px - 1.0).powi(2) + (py - 2.0).powi(2)).sqrt();
            assert!((r - 3.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_layers_accumulate() {
        let mut vis = Visualizer::new();
        let edges = vec![
            (Position::from_vec(vec![1.0, 0.0]), Position::from_vec(vec![0.0, 0.0])),
            (Position::from_vec(vec![2.0, 1.0]), Position::from_vec(vec![1.0, 0.0])),
        ];
        let obstacles = [CircleObstacle::new(0.0, 0.0, 1.0)];
        vis.plot_tree(&edges)
            .plot_obstacles(obstacles.iter())
            .plot_start(Point2D::new(0.0, 0.0));
        assert_eq!(vis.layer_count(), 4);
    }
}
