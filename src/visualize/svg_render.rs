//! Top-down SVG rendering of flow scenes
//!
//! Points are projected onto the x-y plane, one file per batch and view pair.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use svg::node::element::{Circle, Group, Line, Rectangle, Text};
use svg::Document;
use tracing::info;

use super::{FlowRenderer, FlowScene, DISPLACED_COLOR, SOURCE_COLOR, TARGET_COLOR};
use crate::data::Batch;
use crate::models::TestResult;

const CANVAS: f32 = 800.0;
const MARGIN: f32 = 40.0;
const POINT_RADIUS: f32 = 1.5;
const LINE_COLOR: &str = "#888888";

/// Writes `batch{idx}_view{i}_to_{j}.svg` files
pub struct SvgRenderer {
    out_dir: PathBuf,
}

impl SvgRenderer {
    /// Create `out_dir` if needed
    pub fn new(out_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("Failed to create visualization directory: {:?}", out_dir))?;
        Ok(Self {
            out_dir: out_dir.to_path_buf(),
        })
    }

    fn document(scene: &FlowScene) -> Document {
        let (lo, hi) = scene.bounds();
        let span = (hi[0] - lo[0]).max(hi[1] - lo[1]).max(1e-6);
        let scale = (CANVAS - 2.0 * MARGIN) / span;
        // flip y so +y points up
        let project = |p: [f32; 3]| {
            (
                MARGIN + (p[0] - lo[0]) * scale,
                CANVAS - MARGIN - (p[1] - lo[1]) * scale,
            )
        };

        let mut lines = Group::new()
            .set("stroke", LINE_COLOR)
            .set("stroke-width", 0.5);
        for (a, b) in scene.correspondences() {
            let (x1, y1) = project(a);
            let (x2, y2) = project(b);
            lines = lines.add(
                Line::new()
                    .set("x1", x1)
                    .set("y1", y1)
                    .set("x2", x2)
                    .set("y2", y2),
            );
        }

        let cloud = |points: &[[f32; 3]], color: [f32; 3]| {
            let mut group = Group::new().set("fill", hex(color));
            for &p in points {
                let (cx, cy) = project(p);
                group = group.add(
                    Circle::new()
                        .set("cx", cx)
                        .set("cy", cy)
                        .set("r", POINT_RADIUS),
                );
            }
            group
        };

        let title = Text::new(format!(
            "view {} -> view {}: source (red), source + flow (green), target (blue)",
            scene.pair.0, scene.pair.1
        ))
        .set("x", MARGIN)
        .set("y", MARGIN / 2.0)
        .set("font-size", 14)
        .set("font-family", "monospace");

        Document::new()
            .set("width", CANVAS)
            .set("height", CANVAS)
            .set("viewBox", (0, 0, CANVAS as i32, CANVAS as i32))
            .add(
                Rectangle::new()
                    .set("width", "100%")
                    .set("height", "100%")
                    .set("fill", "white"),
            )
            .add(lines)
            .add(cloud(&scene.source, SOURCE_COLOR))
            .add(cloud(&scene.displaced, DISPLACED_COLOR))
            .add(cloud(&scene.target, TARGET_COLOR))
            .add(title)
    }
}

impl FlowRenderer for SvgRenderer {
    fn render(&mut self, batch_idx: usize, result: &TestResult, batch: &Batch) -> Result<()> {
        for &pair in result.keys() {
            println!(
                "Visualizing scene flow computed from view {} to view {}.",
                pair.0, pair.1
            );
            let scene = FlowScene::extract(pair, result, batch)?;
            let path = self
                .out_dir
                .join(format!("batch{:04}_view{}_to_{}.svg", batch_idx, pair.0, pair.1));
            svg::save(&path, &Self::document(&scene))
                .with_context(|| format!("Failed to write {:?}", path))?;
            info!("Wrote {:?}", path);
        }
        Ok(())
    }
}

fn hex(color: [f32; 3]) -> String {
    let [r, g, b] = color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
    format!("#{:02X}{:02X}{:02X}", r, g, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex() {
        assert_eq!(hex(SOURCE_COLOR), "#FF0000");
        assert_eq!(hex([0.0, 0.5, 1.0]), "#0080FF");
    }

    #[test]
    fn test_document_has_every_point_and_line() {
        let scene = FlowScene {
            pair: (0, 1),
            source: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            displaced: vec![[0.0, 1.0, 0.0], [1.0, 1.0, 0.0]],
            target: vec![[0.0, 1.0, 0.0]],
        };
        let text = SvgRenderer::document(&scene).to_string();
        assert_eq!(text.matches("<circle").count(), 5);
        assert_eq!(text.matches("<line").count(), 2);
        assert!(text.contains("#00FF00"));
    }
}
