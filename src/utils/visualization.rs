//! Visualization utilities for behavior_planner
//!
//! Collects rollouts, the tracked path, obstacles and the vehicle outline,
//! then renders them onto a single gnuplot axes.

use gnuplot::{AutoOption, AxesCommon, Caption, Color, Figure, LineWidth, PointSize, PointSymbol};

use crate::common::{DetectedObject, PlannerError, PlannerResult, Point2D, Pose2D, VehicleInfo, Waypoint};

/// Color palette for consistent styling
pub mod colors {
    pub const BLACK: &str = "#000000";
    pub const RED: &str = "#FF0000";
    pub const GREEN: &str = "#00FF00";
    pub const BLUE: &str = "#0000FF";
    pub const CYAN: &str = "#00FFFF";
    pub const ORANGE: &str = "#FFA500";
    pub const GRAY: &str = "#808080";

    pub const OBSTACLE: &str = BLACK;
    pub const GOAL: &str = BLUE;
    pub const TRACKED_PATH: &str = RED;
    pub const ROLLOUT: &str = GRAY;
    pub const REFERENCE: &str = GREEN;
    pub const VEHICLE: &str = CYAN;
    pub const PREDICTION: &str = ORANGE;
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
        Self::new(colors::TRACKED_PATH, "Tracked path")
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
enum Series {
    Lines { x: Vec<f64>, y: Vec<f64>, style: PathStyle },
    Points { x: Vec<f64>, y: Vec<f64>, style: PointStyle },
}

/// Accumulates plot series and renders them on demand
pub struct Visualizer {
    series: Vec<Series>,
    title: String,
    x_label: String,
    y_label: String,
    aspect_ratio: Option<f64>,
}

impl Visualizer {
    pub fn new() -> Self {
        Self {
            series: Vec::new(),
            title: String::new(),
            x_label: "X [m]".to_string(),
            y_label: "Y [m]".to_string(),
            aspect_ratio: Some(1.0),
        }
    }

    pub fn set_title(&mut self, title: &str) -> &mut Self {
        self.title = title.to_string();
        self
    }

    pub fn set_aspect_ratio(&mut self, ratio: Option<f64>) -> &mut Self {
        self.aspect_ratio = ratio;
        self
    }

    /// Number of queued series
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn plot_path(&mut self, path: &[Waypoint], style: &PathStyle) -> &mut Self {
        if path.is_empty() {
            return self;
        }
        self.series.push(Series::Lines {
            x: path.iter().map(|wp| wp.pose.x).collect(),
            y: path.iter().map(|wp| wp.pose.y).collect(),
            style: style.clone(),
        });
        self
    }

    /// Predicted obstacle paths as points
    pub fn plot_predictions(&mut self, paths: &[Vec<Waypoint>]) -> &mut Self {
        let points: Vec<Point2D> = paths.iter().flatten().map(|wp| wp.position()).collect();
        if points.is_empty() {
            return self;
        }
        self.plot_points(
            &points,
            &PointStyle::new(colors::PREDICTION, "Predicted").with_size(0.4),
        )
    }

    /// Plot every rollout of a set; only the first carries a caption
    pub fn plot_rollouts(&mut self, rollouts: &[Vec<Waypoint>]) -> &mut Self {
        for (i, rollout) in rollouts.iter().enumerate() {
            let caption = if i == 0 { "Rollouts" } else { "" };
            self.plot_path(rollout, &PathStyle::new(colors::ROLLOUT, caption).with_line_width(1.0));
        }
        self
    }

    pub fn plot_obstacles(&mut self, obstacles: &[DetectedObject]) -> &mut Self {
        let points: Vec<Point2D> = obstacles.iter().flat_map(|o| o.contour_points()).collect();
        if points.is_empty() {
            return self;
        }
        self.plot_points(
            &points,
            &PointStyle::new(colors::OBSTACLE, "Obstacles").with_symbol('S').with_size(0.5),
        )
    }

    pub fn plot_points(&mut self, points: &[Point2D], style: &PointStyle) -> &mut Self {
        self.series.push(Series::Points {
            x: points.iter().map(|p| p.x).collect(),
            y: points.iter().map(|p| p.y).collect(),
            style: style.clone(),
        });
        self
    }

    pub fn plot_goal(&mut self, goal: Point2D) -> &mut Self {
        self.plot_points(&[goal], &PointStyle::new(colors::GOAL, "Goal").with_size(1.5))
    }

    /// Closed vehicle outline at `pose`
    pub fn plot_vehicle(&mut self, pose: &Pose2D, vehicle: &VehicleInfo) -> &mut Self {
        let mut outline = vehicle.footprint_at(pose);
        if let Some(first) = outline.first().copied() {
            outline.push(first);
        }
        self.series.push(Series::Lines {
            x: outline.iter().map(|p| p.x).collect(),
            y: outline.iter().map(|p| p.y).collect(),
            style: PathStyle::new(colors::VEHICLE, "Vehicle"),
        });
        self
    }

    fn render(&self) -> Figure {
        let mut figure = Figure::new();
        {
            let axes = figure.axes2d();
            for series in &self.series {
                match series {
                    Series::Lines { x, y, style } => {
                        axes.lines(
                            x,
                            y,
                            &[
                                Caption(&style.caption),
                                Color(&style.color),
                                LineWidth(style.line_width),
                            ],
                        );
                    }
                    Series::Points { x, y, style } => {
                        axes.points(
                            x,
                            y,
                            &[
                                Caption(&style.caption),
                                Color(&style.color),
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
            if let Some(ratio) = self.aspect_ratio {
                axes.set_aspect_ratio(AutoOption::Fix(ratio));
            }
        }
        figure
    }

    /// Save plot to PNG file
    pub fn save_png(&self, path: &str, width: u32, height: u32) -> PlannerResult<()> {
        self.render()
            .save_to_png(path, width, height)
            .map_err(|e| PlannerError::Visualization(e.to_string()))
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}
