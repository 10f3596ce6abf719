//! Rendering backend that prints frames to a writer.

use std::io::Write;

use anyhow::{Context, Result};
use clap::ValueEnum;
use route_replay_rendering::{MarkerChange, Presentation, RenderingBackend, Scene};
use serde::Serialize;

/// Output encoding of printed frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per frame.
    Json,
}

#[derive(Serialize)]
struct FrameRecord<'a> {
    label: &'a str,
    markers: Vec<MarkerRecord>,
}

#[derive(Serialize)]
struct MarkerRecord {
    agent: u32,
    lat: f64,
    lon: f64,
    color: String,
}

/// Prints every frame produced by the update closure.
#[derive(Debug)]
pub(crate) struct TextBackend<W> {
    writer: W,
    format: OutputFormat,
}

impl<W: Write> TextBackend<W> {
    pub(crate) fn new(writer: W, format: OutputFormat) -> Self {
        Self { writer, format }
    }

    fn draw_header(&mut self, presentation: &Presentation) -> Result<()> {
        if self.format == OutputFormat::Json {
            return Ok(());
        }
        writeln!(self.writer, "{}", presentation.title)?;
        for line in &presentation.scene.trajectories {
            let points: Vec<String> = line
                .points
                .iter()
                .map(|point| format!("({:.4}, {:.4})", point.y, point.x))
                .collect();
            writeln!(
                self.writer,
                "route {} {}: {}",
                line.agent,
                line.color.to_hex(),
                points.join(" -> ")
            )?;
        }
        Ok(())
    }

    fn draw(&mut self, scene: &Scene) -> Result<()> {
        match self.format {
            OutputFormat::Text => {
                writeln!(self.writer, "[{}]", scene.label)?;
                for change in &scene.changes {
                    match change {
                        MarkerChange::Spawned(marker) => writeln!(
                            self.writer,
                            "  + agent {} at ({:.5}, {:.5})",
                            marker.agent, marker.position.y, marker.position.x
                        )?,
                        MarkerChange::Moved { agent, to, .. } => writeln!(
                            self.writer,
                            "  > agent {agent} to ({:.5}, {:.5})",
                            to.y, to.x
                        )?,
                        MarkerChange::Removed(agent) => {
                            writeln!(self.writer, "  - agent {agent}")?;
                        }
                    }
                }
            }
            OutputFormat::Json => {
                let record = FrameRecord {
                    label: &scene.label,
                    markers: scene
                        .board
                        .markers()
                        .map(|marker| MarkerRecord {
                            agent: marker.agent.get(),
                            lat: marker.position.y,
                            lon: marker.position.x,
                            color: marker.color.to_hex(),
                        })
                        .collect(),
                };
                serde_json::to_writer(&mut self.writer, &record)
                    .context("failed to encode frame as json")?;
                writeln!(self.writer)?;
            }
        }
        Ok(())
    }
}

impl<W: Write> RenderingBackend for TextBackend<W> {
    fn run<F>(mut self, presentation: Presentation, mut update_scene: F) -> Result<()>
    where
        F: FnMut(&mut Scene) -> Result<bool>,
    {
        self.draw_header(&presentation)?;
        let mut scene = presentation.scene;
        while update_scene(&mut scene)? {
            self.draw(&scene)?;
        }
        self.writer.flush().context("failed to flush frame output")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use route_replay_core::{AgentId, Coordinate, Generation};
    use route_replay_rendering::{MarkerFrame, MarkerPresentation};

    fn frames() -> Vec<MarkerFrame> {
        vec![
            MarkerFrame {
                generation: Generation::new(1),
                label: "01.01.2024 00:00:00".to_owned(),
                markers: vec![MarkerPresentation::new(
                    AgentId::new(1),
                    Coordinate::new(55.7, 37.6),
                )],
            },
            MarkerFrame {
                generation: Generation::new(2),
                label: "01.01.2024 00:00:30".to_owned(),
                markers: Vec::new(),
            },
        ]
    }

    fn render(format: OutputFormat) -> String {
        let mut output = Vec::new();
        let mut pending = frames().into_iter();
        TextBackend::new(&mut output, format)
            .run(Presentation::new("replay", Scene::default()), |scene| {
                Ok(match pending.next() {
                    Some(frame) => {
                        scene.apply_frame(&frame);
                        true
                    }
                    None => false,
                })
            })
            .expect("rendering into memory succeeds");
        String::from_utf8(output).expect("output is utf-8")
    }

    #[test]
    fn text_output_lists_marker_changes() {
        let expected = [
            "replay",
            "[01.01.2024 00:00:00]",
            "  + agent 1 at (55.70000, 37.60000)",
            "[01.01.2024 00:00:30]",
            "  - agent 1",
        ];
        assert_eq!(render(OutputFormat::Text), format!("{}\n", expected.join("\n")));
    }

    #[test]
    fn json_output_emits_one_line_per_frame() {
        let output = render(OutputFormat::Json);
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            concat!(
                r#"{"label":"01.01.2024 00:00:00","markers":"#,
                r##"[{"agent":1,"lat":55.7,"lon":37.6,"color":"#00FF00"}]}"##,
            )
        );
        assert_eq!(lines[1], r#"{"label":"01.01.2024 00:00:30","markers":[]}"#);
    }
}
