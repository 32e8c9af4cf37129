// ASCII rendering of a classified layout

use super::{Device, DeviceSide, Directive, Layout, NodeBox, Slot, Span};
use crate::routes::AddressFamily;

/// Columns between two boxes drawn side by side
const GUTTER: usize = 2;

/// Placement arithmetic for one canvas
struct Canvas {
    family: AddressFamily,
    /// Interior width of every box
    inner: usize,
    span: Span,
}

impl Canvas {
    fn new(family: AddressFamily, span: Span) -> Self {
        Canvas {
            family,
            inner: family.box_width(),
            span,
        }
    }

    fn box_width(&self) -> usize {
        self.inner + 2
    }

    fn width(&self) -> usize {
        match self.span {
            Span::Single => self.box_width(),
            Span::Double => 2 * self.box_width() + GUTTER,
        }
    }

    /// Left edge of a centred box
    fn single_offset(&self) -> usize {
        (self.width() - self.box_width()) / 2
    }

    fn centre(&self) -> usize {
        self.single_offset() + self.box_width() / 2
    }

    fn pair_centres(&self) -> (usize, usize) {
        let half = self.box_width() / 2;
        (half, self.box_width() + GUTTER + half)
    }

    fn border(&self) -> String {
        format!("+{}+", "-".repeat(self.inner))
    }

    /// `| text |` with the text left aligned and cut to fit
    fn content(&self, text: &str) -> String {
        let width = self.inner - 2;
        format!("| {:<width$} |", fit(text, width))
    }

    fn centred(&self, text: &str) -> String {
        let width = self.inner;
        format!("|{:^width$}|", fit(text, width))
    }

    fn node_lines(&self, node: &NodeBox) -> Vec<String> {
        let mut lines = vec![
            self.border(),
            self.content(node.role.label()),
            self.content(&format!("IP: {}", node.address)),
        ];
        if let Some(neighbor) = &node.neighbor {
            lines.push(self.content(&format!("{}: {}", self.family.neighbor_label(), neighbor)));
        }
        lines.push(self.border());
        lines
    }

    fn device_lines(&self, device: &Device) -> Vec<String> {
        let label = device.role.label();
        let mut lines = vec![self.border()];
        lines.extend(side_fields(&device.upper).iter().map(|field| self.content(field)));
        lines.push(self.centred(label));
        if let Some(lower) = &device.lower {
            // Mirrored so each interface name sits next to its own connector
            lines.push(self.centred(label));
            lines.extend(side_fields(lower).iter().rev().map(|field| self.content(field)));
        }
        lines.push(self.border());
        lines
    }

    fn bars(&self, columns: &[usize]) -> String {
        let mut row = vec![b' '; self.width()];
        for &column in columns {
            if let Some(cell) = row.get_mut(column) {
                *cell = b'|';
            }
        }
        String::from_utf8_lossy(&row).into_owned()
    }

    fn lan(&self) -> String {
        let (left, right) = self.pair_centres();
        let mut row = vec![b'-'; self.width()];
        for column in [left, self.centre(), right] {
            if let Some(cell) = row.get_mut(column) {
                *cell = b'+';
            }
        }
        String::from_utf8_lossy(&row).into_owned()
    }

    fn place_single(&self, out: &mut Vec<String>, lines: Vec<String>) {
        let indent = " ".repeat(self.single_offset());
        out.extend(lines.into_iter().map(|line| format!("{}{}", indent, line)));
    }

    fn place_pair(&self, out: &mut Vec<String>, left: &Slot, right: &Slot) {
        let mut left = self.slot_lines(left);
        let mut right = self.slot_lines(right);
        let height = left.len().max(right.len()).max(1);
        self.pad_slot(&mut left, height);
        self.pad_slot(&mut right, height);

        let gutter = " ".repeat(GUTTER);
        out.extend(
            left.into_iter()
                .zip(right)
                .map(|(l, r)| format!("{}{}{}", l, gutter, r)),
        );
    }

    fn slot_lines(&self, slot: &Slot) -> Vec<String> {
        match slot {
            Slot::Node(node) => self.node_lines(node),
            Slot::PassThrough => Vec::new(),
        }
    }

    /// Stretch a slot to `height`: boxes grow blank rows, pass-throughs become bars
    fn pad_slot(&self, lines: &mut Vec<String>, height: usize) {
        if lines.is_empty() {
            let mut bar = " ".repeat(self.box_width());
            bar.replace_range(self.box_width() / 2..self.box_width() / 2 + 1, "|");
            lines.resize(height, bar);
            return;
        }
        while lines.len() < height {
            let bottom = lines.len() - 1;
            lines.insert(bottom, self.content(""));
        }
    }
}

fn side_fields(side: &DeviceSide) -> Vec<String> {
    let mut fields = vec![
        format!("Interface: {}", side.interface),
        format!("MAC: {}", side.link_address.as_deref().unwrap_or("none")),
        format!(
            "IP: {}",
            side.address.map_or_else(|| "none".to_string(), |addr| addr.to_string())
        ),
        format!("Net: {}", side.network),
    ];
    if let Some(mask) = &side.mask {
        fields.push(format!("Mask: {}", mask));
    }
    fields
}

fn fit(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

/// Draw the layout as text, one line per row, top to bottom
pub fn render(layout: &Layout) -> String {
    let canvas = Canvas::new(layout.family, layout.span);
    let mut lines = Vec::new();

    for directive in &layout.directives {
        match directive {
            Directive::Single(node) => canvas.place_single(&mut lines, canvas.node_lines(node)),
            Directive::Pair(left, right) => canvas.place_pair(&mut lines, left, right),
            Directive::Link => lines.push(canvas.bars(&[canvas.centre()])),
            Directive::PairLink => {
                let (left, right) = canvas.pair_centres();
                lines.push(canvas.bars(&[left, right]));
            }
            Directive::Lan => lines.push(canvas.lan()),
            Directive::Device(device) => canvas.place_single(&mut lines, canvas.device_lines(device)),
        }
    }

    let mut text = String::new();
    for line in &lines {
        text.push_str(line.trim_end());
        text.push('\n');
    }
    text
}
