//! ---
//! ems_section: "06-diagram-rendering"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Diagram layout, SVG rendering, and artifact caching."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use gridscope_model::{EquipmentKind, SwitchKind};
use svg::node::element::{Circle, Group, Polygon, Polyline, Rectangle, Style, Text};
use svg::Document;

use crate::artifact::{BoundingBox, Direction, Point};
use crate::layout::{PlacedSwitch, SldLayout, BUSBAR_Y, MARGIN, SWITCH_SIZE};

const STYLE: &str = "\
.sld-wire{fill:none;stroke-width:2}\
.sld-label{font-family:sans-serif;font-size:11px;text-anchor:middle}\
.sld-title{font-family:sans-serif;font-size:14px;font-weight:bold}\
.sld-symbol-text{font-family:sans-serif;font-size:10px;text-anchor:middle;dominant-baseline:central}\
.sld-disconnected{stroke-dasharray:4 3}";

/// Colour of a voltage class, keyed by nominal voltage in kV.
pub(crate) fn voltage_color(nominal_kv: f64) -> &'static str {
    match nominal_kv {
        kv if kv >= 300.0 => "#d7191c",
        kv if kv >= 180.0 => "#1a9641",
        kv if kv >= 120.0 => "#2b83ba",
        kv if kv >= 70.0 => "#f28e2b",
        kv if kv >= 30.0 => "#9467bd",
        _ => "#8c564b",
    }
}

fn points(wire: &[Point]) -> String {
    wire.iter()
        .map(|p| format!("{},{}", p.x, p.y))
        .collect::<Vec<_>>()
        .join(" ")
}

fn rect(bbox: &BoundingBox) -> Rectangle {
    Rectangle::new()
        .set("x", bbox.x)
        .set("y", bbox.y)
        .set("width", bbox.width)
        .set("height", bbox.height)
}

fn wire(wire: &[Point], color: &str, connected: bool) -> Polyline {
    let class = if connected {
        "sld-wire"
    } else {
        "sld-wire sld-disconnected"
    };
    Polyline::new()
        .set("class", class)
        .set("stroke", color)
        .set("points", points(wire))
}

fn label(text: &str, x: f32, y: f32) -> Text {
    Text::new(text).set("class", "sld-label").set("x", x).set("y", y)
}

fn switch_node(placed: &PlacedSwitch<'_>, color: &str) -> Group {
    let switch = placed.switch;
    let (class, width) = match switch.kind {
        SwitchKind::Breaker => ("sld-breaker", SWITCH_SIZE),
        SwitchKind::Disconnector => ("sld-disconnector", SWITCH_SIZE * 0.6),
        SwitchKind::LoadBreakSwitch => ("sld-load-break-switch", SWITCH_SIZE * 0.8),
    };
    let center = placed.bbox.center();
    let body = BoundingBox::centered(center, width, SWITCH_SIZE);
    let fill = if switch.open { "#ffffff" } else { color };
    let state = if switch.open { "sld-open" } else { "sld-closed" };
    Group::new()
        .set("id", placed.svg_id.as_str())
        .set("class", format!("{class} {state}"))
        .add(
            rect(&body)
                .set("fill", fill)
                .set("stroke", color)
                .set("stroke-width", 2),
        )
}

fn symbol(kind: EquipmentKind, bbox: &BoundingBox, direction: Direction, color: &str) -> Group {
    let c = bbox.center();
    let r = bbox.width / 2.0;
    let group = Group::new();
    let letter = |text: &str| {
        Text::new(text)
            .set("class", "sld-symbol-text")
            .set("x", c.x)
            .set("y", c.y)
    };
    let outline = |shape: Rectangle| shape.set("fill", "#ffffff").set("stroke", color).set("stroke-width", 2);
    match kind {
        EquipmentKind::Generator => group
            .add(
                Circle::new()
                    .set("cx", c.x)
                    .set("cy", c.y)
                    .set("r", r)
                    .set("fill", "#ffffff")
                    .set("stroke", color)
                    .set("stroke-width", 2),
            )
            .add(letter("G")),
        EquipmentKind::Load => {
            // Triangle pointing away from the busbar.
            let tip = match direction {
                Direction::Top => c.y - r,
                Direction::Bottom => c.y + r,
            };
            let base = match direction {
                Direction::Top => c.y + r,
                Direction::Bottom => c.y - r,
            };
            group.add(
                Polygon::new()
                    .set(
                        "points",
                        points(&[
                            Point::new(c.x - r, base),
                            Point::new(c.x + r, base),
                            Point::new(c.x, tip),
                        ]),
                    )
                    .set("fill", color),
            )
        }
        EquipmentKind::Battery => group.add(outline(rect(bbox))).add(letter("B")),
        EquipmentKind::ShuntCompensator => group.add(outline(rect(bbox))).add(letter("C")),
        EquipmentKind::StaticVarCompensator => group.add(outline(rect(bbox))).add(letter("SVC")),
        EquipmentKind::DanglingLine => group.add(outline(rect(bbox))).add(letter("DL")),
        EquipmentKind::TwoWindingsTransformer => {
            let winding = |cy: f32| {
                Circle::new()
                    .set("cx", c.x)
                    .set("cy", cy)
                    .set("r", r * 0.6)
                    .set("fill", "none")
                    .set("stroke", color)
                    .set("stroke-width", 2)
            };
            group.add(winding(c.y - r * 0.35)).add(winding(c.y + r * 0.35))
        }
        EquipmentKind::Line
        | EquipmentKind::Bus
        | EquipmentKind::BusbarSection
        | EquipmentKind::Switch => {
            let tip = match direction {
                Direction::Top => c.y - r,
                Direction::Bottom => c.y + r,
            };
            group.add(
                Polygon::new()
                    .set(
                        "points",
                        points(&[
                            Point::new(c.x - r / 2.0, c.y),
                            Point::new(c.x + r / 2.0, c.y),
                            Point::new(c.x, tip),
                        ]),
                    )
                    .set("fill", color),
            )
        }
    }
}

/// Draw a single-line layout. Output depends only on the layout.
pub(crate) fn single_line(layout: &SldLayout<'_>) -> Document {
    let level = layout.level;
    let color = voltage_color(level.nominal_kv);
    let title = match &level.name {
        Some(name) => format!("{name} ({}) - {} kV", level.id, level.nominal_kv),
        None => format!("{} - {} kV", level.id, level.nominal_kv),
    };

    let mut doc = Document::new()
        .set("viewBox", format!("0 0 {} {}", layout.width, layout.height))
        .set("width", layout.width)
        .set("height", layout.height)
        .add(Style::new(STYLE))
        .add(
            Text::new(title)
                .set("class", "sld-title")
                .set("x", MARGIN)
                .set("y", MARGIN / 2.0 + 10.0),
        );

    for coupler in &layout.couplers {
        doc = doc.add(wire(&coupler.wire, color, true));
    }
    for feeder in &layout.feeders {
        doc = doc.add(wire(&feeder.wire, color, feeder.connected));
    }

    for busbar in &layout.busbars {
        doc = doc.add(
            Group::new()
                .set("id", busbar.svg_id.as_str())
                .set("class", "sld-busbar")
                .add(rect(&busbar.bbox).set("fill", color))
                .add(label(&busbar.label, busbar.bbox.x + 20.0, BUSBAR_Y - 8.0)),
        );
    }

    for coupler in &layout.couplers {
        doc = doc.add(switch_node(&coupler.switch, color));
    }

    for feeder in &layout.feeders {
        for switch in &feeder.switches {
            doc = doc.add(switch_node(switch, color));
        }
        let label_y = match feeder.direction {
            Direction::Top => feeder.symbol.y - 8.0,
            Direction::Bottom => feeder.symbol.y + feeder.symbol.height + 14.0,
        };
        let mut group = Group::new()
            .set("id", feeder.svg_id.as_str())
            .set("class", format!("sld-{}", feeder.kind))
            .add(symbol(feeder.kind, &feeder.symbol, feeder.direction, color))
            .add(label(&feeder.label, feeder.symbol.center().x, label_y));
        if let Some(remote) = feeder.remote_voltage_level {
            let remote_y = match feeder.direction {
                Direction::Top => label_y - 13.0,
                Direction::Bottom => label_y + 13.0,
            };
            group = group.add(
                label(remote, feeder.symbol.center().x, remote_y).set("class", "sld-label sld-remote"),
            );
        }
        doc = doc.add(group);
    }

    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voltage_classes_have_distinct_colours() {
        let colours = [400.0, 225.0, 150.0, 90.0, 63.0, 20.0].map(voltage_color);
        for (i, a) in colours.iter().enumerate() {
            for b in &colours[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn points_render_as_svg_pairs() {
        assert_eq!(
            points(&[Point::new(1.0, 2.5), Point::new(3.0, 4.0)]),
            "1,2.5 3,4"
        );
    }
}
