//! Graph markup export for activity-on-arrow diagrams.

use pyo3::prelude::*;
use rustc_hash::FxHashMap;

use super::{ActivityEdge, DummyEdge, EdgeId, EventNode, EventNodeType};

#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DashStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
}

#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WeightStyle {
    #[default]
    Normal,
    Bold,
}

/// Per-edge display attributes supplied by the caller.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeDisplay {
    #[pyo3(get, set)]
    pub dash_style: DashStyle,
    #[pyo3(get, set)]
    pub weight_style: WeightStyle,
    #[pyo3(get, set)]
    pub label: String,
    #[pyo3(get, set)]
    pub show_label: bool,
    #[pyo3(get, set)]
    pub thickness: f64,
}

#[pymethods]
impl EdgeDisplay {
    #[new]
    #[pyo3(signature = (
        dash_style=DashStyle::Solid,
        weight_style=WeightStyle::Normal,
        label=String::new(),
        show_label=true,
        thickness=1.0
    ))]
    pub fn new(
        dash_style: DashStyle,
        weight_style: WeightStyle,
        label: String,
        show_label: bool,
        thickness: f64,
    ) -> Self {
        Self {
            dash_style,
            weight_style,
            label,
            show_label,
            thickness,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "EdgeDisplay(dash={:?}, weight={:?}, label={:?}, show_label={}, thickness={})",
            self.dash_style, self.weight_style, self.label, self.show_label, self.thickness
        )
    }
}

impl EdgeDisplay {
    /// Solid and labelled with the activity name; bold when critical.
    pub fn for_activity(edge: &ActivityEdge) -> Self {
        let weight_style = if edge.is_critical {
            WeightStyle::Bold
        } else {
            WeightStyle::Normal
        };
        Self::new(DashStyle::Solid, weight_style, edge.name.clone(), true, 1.0)
    }

    pub fn for_dummy() -> Self {
        Self::new(DashStyle::Dashed, WeightStyle::Normal, String::new(), false, 1.0)
    }
}

pub struct DiagramExporter;

impl DiagramExporter {
    /// Serialize the diagram as UTF-8 graph markup.
    ///
    /// Edges missing from `display` get the defaults from
    /// [`EdgeDisplay::for_activity`] / [`EdgeDisplay::for_dummy`].
    pub fn serialize(
        nodes: &[EventNode],
        activity_edges: &[ActivityEdge],
        dummy_edges: &[DummyEdge],
        display: &FxHashMap<EdgeId, EdgeDisplay>,
    ) -> Vec<u8> {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str(&format!(
            "<graph nodeCount=\"{}\" edgeCount=\"{}\">\n",
            nodes.len(),
            activity_edges.len() + dummy_edges.len()
        ));

        out.push_str("  <nodes>\n");
        for node in nodes {
            out.push_str(&format!(
                "    <node id=\"{}\" type=\"{}\" earliestFinish=\"{}\" latestFinish=\"{}\"/>\n",
                node.id,
                node_type_name(node.node_type),
                node.earliest_finish_time,
                node.latest_finish_time
            ));
        }
        out.push_str("  </nodes>\n");

        out.push_str("  <edges>\n");
        for edge in activity_edges {
            let attrs = display
                .get(&edge.id)
                .cloned()
                .unwrap_or_else(|| EdgeDisplay::for_activity(edge));
            write_edge(&mut out, edge.id, &edge.name, edge.source, edge.target, false, &attrs);
        }
        for edge in dummy_edges {
            let attrs = display.get(&edge.id).cloned().unwrap_or_else(EdgeDisplay::for_dummy);
            write_edge(&mut out, edge.id, "", edge.source, edge.target, true, &attrs);
        }
        out.push_str("  </edges>\n");
        out.push_str("</graph>\n");

        out.into_bytes()
    }
}

fn write_edge(
    out: &mut String,
    id: EdgeId,
    name: &str,
    source: u32,
    target: u32,
    dummy: bool,
    attrs: &EdgeDisplay,
) {
    out.push_str(&format!(
        "    <edge id=\"{}\" name=\"{}\" source=\"{}\" target=\"{}\" dummy=\"{}\" \
         dashStyle=\"{}\" weightStyle=\"{}\" label=\"{}\" showLabel=\"{}\" thickness=\"{}\"/>\n",
        id,
        escape(name),
        source,
        target,
        dummy,
        dash_style_name(attrs.dash_style),
        weight_style_name(attrs.weight_style),
        escape(&attrs.label),
        attrs.show_label,
        attrs.thickness
    ));
}

fn node_type_name(node_type: EventNodeType) -> &'static str {
    match node_type {
        EventNodeType::Start => "start",
        EventNodeType::Normal => "normal",
        EventNodeType::End => "end",
        EventNodeType::Isolated => "isolated",
        EventNodeType::Dummy => "dummy",
    }
}

fn dash_style_name(style: DashStyle) -> &'static str {
    match style {
        DashStyle::Solid => "solid",
        DashStyle::Dashed => "dashed",
        DashStyle::Dotted => "dotted",
    }
}

fn weight_style_name(style: WeightStyle) -> &'static str {
    match style {
        WeightStyle::Normal => "normal",
        WeightStyle::Bold => "bold",
    }
}

/// Escape text for use inside a double-quoted attribute.
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u32, node_type: EventNodeType, earliest: i64, latest: i64) -> EventNode {
        EventNode {
            id,
            node_type,
            earliest_finish_time: earliest,
            latest_finish_time: latest,
            incoming_edges: Vec::new(),
            outgoing_edges: Vec::new(),
        }
    }

    fn activity_edge(
        id: EdgeId,
        name: &str,
        source: u32,
        target: u32,
        is_critical: bool,
    ) -> ActivityEdge {
        ActivityEdge {
            id,
            activity_id: id,
            name: name.to_string(),
            duration: 1,
            source,
            target,
            is_critical,
        }
    }

    fn render(
        nodes: &[EventNode],
        activity_edges: &[ActivityEdge],
        dummy_edges: &[DummyEdge],
        display: &FxHashMap<EdgeId, EdgeDisplay>,
    ) -> String {
        let bytes = DiagramExporter::serialize(nodes, activity_edges, dummy_edges, display);
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_nodes_and_default_edge_styles() {
        let nodes = vec![
            node(1, EventNodeType::Start, 0, 0),
            node(2, EventNodeType::Normal, 3, 3),
            node(3, EventNodeType::End, 5, 5),
        ];
        let edges = vec![
            activity_edge(1, "Design", 1, 2, true),
            activity_edge(2, "Build", 2, 3, false),
        ];
        let dummies = vec![DummyEdge { id: 3, source: 2, target: 3 }];
        let doc = render(&nodes, &edges, &dummies, &FxHashMap::default());

        assert!(doc.starts_with("<?xml"));
        assert!(doc.contains("<graph nodeCount=\"3\" edgeCount=\"3\">"));
        assert!(doc.contains(
            "<node id=\"2\" type=\"normal\" earliestFinish=\"3\" latestFinish=\"3\"/>"
        ));
        assert!(doc.contains(
            "<edge id=\"1\" name=\"Design\" source=\"1\" target=\"2\" dummy=\"false\" \
             dashStyle=\"solid\" weightStyle=\"bold\" label=\"Design\" \
             showLabel=\"true\" thickness=\"1\"/>"
        ));
        assert!(doc.contains("weightStyle=\"normal\" label=\"Build\""));
        assert!(doc.contains(
            "<edge id=\"3\" name=\"\" source=\"2\" target=\"3\" dummy=\"true\" \
             dashStyle=\"dashed\" weightStyle=\"normal\" label=\"\" \
             showLabel=\"false\" thickness=\"1\"/>"
        ));
        assert!(doc.ends_with("</graph>\n"));
    }

    #[test]
    fn test_caller_display_overrides_defaults() {
        let nodes = vec![
            node(1, EventNodeType::Isolated, 0, 4),
            node(2, EventNodeType::Isolated, 4, 4),
        ];
        let edges = vec![activity_edge(7, "Review", 1, 2, false)];
        let mut display = FxHashMap::default();
        display.insert(
            7,
            EdgeDisplay::new(DashStyle::Dotted, WeightStyle::Bold, "R".to_string(), false, 2.5),
        );
        let doc = render(&nodes, &edges, &[], &display);

        assert!(doc.contains("type=\"isolated\""));
        assert!(doc.contains(
            "dashStyle=\"dotted\" weightStyle=\"bold\" label=\"R\" \
             showLabel=\"false\" thickness=\"2.5\""
        ));
    }

    #[test]
    fn test_names_are_escaped() {
        let nodes = vec![node(1, EventNodeType::Start, 0, 0), node(2, EventNodeType::End, 1, 1)];
        let edges = vec![activity_edge(1, "R&D <\"phase\">", 1, 2, true)];
        let doc = render(&nodes, &edges, &[], &FxHashMap::default());
        assert!(doc.contains("name=\"R&amp;D &lt;&quot;phase&quot;&gt;\""));
        assert!(!doc.contains("R&D"));
    }

    #[test]
    fn test_empty_diagram() {
        let doc = render(&[], &[], &[], &FxHashMap::default());
        assert!(doc.contains("<graph nodeCount=\"0\" edgeCount=\"0\">"));
        assert!(doc.contains("<nodes>\n  </nodes>"));
    }
}
