//! Just enough SVG to pull filled outlines out of traced artwork: paths,
//! basic shapes and the transforms of their groups. Styling, text and
//! `<use>` references are ignored.

use std::f64::consts::{FRAC_PI_2, TAU};

use anyhow::{Context, Result, bail, ensure};
use glam::{DAffine2, DVec2};
use log::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Segment {
    Line(DVec2),
    Quad(DVec2, DVec2),
    Cubic(DVec2, DVec2, DVec2),
}

impl Segment {
    pub fn end(&self) -> DVec2 {
        match *self {
            Segment::Line(to) | Segment::Quad(_, to) | Segment::Cubic(_, _, to) => to,
        }
    }

    fn transformed(&self, m: &DAffine2) -> Self {
        let t = |p: DVec2| m.transform_point2(p);
        match *self {
            Segment::Line(to) => Segment::Line(t(to)),
            Segment::Quad(ctrl, to) => Segment::Quad(t(ctrl), t(to)),
            Segment::Cubic(c1, c2, to) => Segment::Cubic(t(c1), t(c2), t(to)),
        }
    }
}

/// One subpath. Filled shapes are always treated as closed.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub start: DVec2,
    pub segments: Vec<Segment>,
}

impl Contour {
    pub fn new(start: DVec2) -> Self {
        Self {
            start,
            segments: Vec::new(),
        }
    }

    pub fn transformed(&self, m: &DAffine2) -> Self {
        Self {
            start: m.transform_point2(self.start),
            segments: self.segments.iter().map(|s| s.transformed(m)).collect(),
        }
    }
}

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_ascii_whitespace() || c == b',') {
            self.pos += 1;
        }
    }

    fn at_end(&mut self) -> bool {
        self.skip_separators();
        self.pos >= self.src.len()
    }

    fn letter(&mut self) -> Option<u8> {
        self.skip_separators();
        let c = self.peek().filter(u8::is_ascii_alphabetic)?;
        self.pos += 1;
        Some(c)
    }

    fn digits(&mut self) -> usize {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        self.pos - start
    }

    fn number(&mut self) -> Result<f64> {
        self.skip_separators();
        let start = self.pos;
        if matches!(self.peek(), Some(b'+' | b'-')) {
            self.pos += 1;
        }
        let mut count = self.digits();
        if self.peek() == Some(b'.') {
            self.pos += 1;
            count += self.digits();
        }
        ensure!(count > 0, "expected a number at offset {start}");
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let mantissa_end = self.pos;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if self.digits() == 0 {
                self.pos = mantissa_end;
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos])?;
        text.parse()
            .with_context(|| format!("invalid number {text:?} at offset {start}"))
    }

    fn flag(&mut self) -> Result<bool> {
        self.skip_separators();
        let flag = match self.peek() {
            Some(b'0') => false,
            Some(b'1') => true,
            _ => bail!("expected an arc flag at offset {}", self.pos),
        };
        self.pos += 1;
        Ok(flag)
    }

    fn point(&mut self) -> Result<DVec2> {
        Ok(DVec2::new(self.number()?, self.number()?))
    }
}

/// Cubic approximation of an SVG elliptical arc, at most a quarter turn per
/// curve. Degenerate radii give a straight line.
pub fn arc_to_cubics(
    from: DVec2,
    radii: DVec2,
    x_rotation_deg: f64,
    large_arc: bool,
    sweep: bool,
    to: DVec2,
) -> Vec<Segment> {
    if from == to {
        return Vec::new();
    }
    let (mut rx, mut ry) = (radii.x.abs(), radii.y.abs());
    if rx == 0.0 || ry == 0.0 {
        return vec![Segment::Line(to)];
    }

    let (sin, cos) = x_rotation_deg.to_radians().sin_cos();
    let half = (from - to) * 0.5;
    let p = DVec2::new(cos * half.x + sin * half.y, -sin * half.x + cos * half.y);

    let lambda = (p.x * p.x) / (rx * rx) + (p.y * p.y) / (ry * ry);
    if lambda > 1.0 {
        rx *= lambda.sqrt();
        ry *= lambda.sqrt();
    }

    let num = rx * rx * ry * ry - rx * rx * p.y * p.y - ry * ry * p.x * p.x;
    let den = rx * rx * p.y * p.y + ry * ry * p.x * p.x;
    let mut coef = (num / den).max(0.0).sqrt();
    if large_arc == sweep {
        coef = -coef;
    }
    let center_prime = DVec2::new(coef * rx * p.y / ry, -coef * ry * p.x / rx);
    let mid = (from + to) * 0.5;
    let center = DVec2::new(
        cos * center_prime.x - sin * center_prime.y + mid.x,
        sin * center_prime.x + cos * center_prime.y + mid.y,
    );

    let angle = |u: DVec2, v: DVec2| u.perp_dot(v).atan2(u.dot(v));
    let u = DVec2::new((p.x - center_prime.x) / rx, (p.y - center_prime.y) / ry);
    let v = DVec2::new((-p.x - center_prime.x) / rx, (-p.y - center_prime.y) / ry);
    let theta = angle(DVec2::X, u);
    let mut delta = angle(u, v);
    if !sweep && delta > 0.0 {
        delta -= TAU;
    } else if sweep && delta < 0.0 {
        delta += TAU;
    }

    let count = (delta.abs() / FRAC_PI_2 - 1e-9).ceil().max(1.0) as usize;
    let step = delta / count as f64;
    let k = 4.0 / 3.0 * (step / 4.0).tan();
    let map = |unit: DVec2| {
        let scaled = DVec2::new(unit.x * rx, unit.y * ry);
        DVec2::new(
            cos * scaled.x - sin * scaled.y + center.x,
            sin * scaled.x + cos * scaled.y + center.y,
        )
    };

    (0..count)
        .map(|i| {
            let a = theta + step * i as f64;
            let b = a + step;
            let (pa, pb) = (DVec2::from_angle(a), DVec2::from_angle(b));
            let c1 = pa + k * pa.perp();
            let c2 = pb - k * pb.perp();
            let end = if i + 1 == count { to } else { map(pb) };
            Segment::Cubic(map(c1), map(c2), end)
        })
        .collect()
}

/// Parses the `d` attribute of a `<path>`.
pub fn parse_path_data(d: &str) -> Result<Vec<Contour>> {
    let mut lexer = Lexer::new(d);
    let mut contours = Vec::new();
    let mut current: Option<Contour> = None;
    let mut pen = DVec2::ZERO;
    let mut start = DVec2::ZERO;
    let mut previous: Option<u8> = None;
    let mut cubic_ctrl: Option<DVec2> = None;
    let mut quad_ctrl: Option<DVec2> = None;

    while !lexer.at_end() {
        let cmd = match (lexer.letter(), previous) {
            (Some(c), _) => c,
            (None, Some(b'M')) => b'L',
            (None, Some(b'm')) => b'l',
            (None, Some(b'Z' | b'z')) => bail!("numbers after closepath at offset {}", lexer.pos),
            (None, Some(c)) => c,
            (None, None) => bail!("path data must start with a command"),
        };
        if previous.is_none() && !matches!(cmd, b'M' | b'm') {
            bail!("path data must start with a moveto");
        }
        previous = Some(cmd);

        let base = if cmd.is_ascii_lowercase() { pen } else { DVec2::ZERO };
        let mut segments = Vec::new();
        let (mut next_cubic, mut next_quad) = (None, None);
        match cmd.to_ascii_uppercase() {
            b'M' => {
                let to = base + lexer.point()?;
                if let Some(done) = current.take().filter(|c| !c.segments.is_empty()) {
                    contours.push(done);
                }
                current = Some(Contour::new(to));
                pen = to;
                start = to;
            }
            b'L' => segments.push(Segment::Line(base + lexer.point()?)),
            b'H' => {
                let x = lexer.number()? + base.x;
                segments.push(Segment::Line(DVec2::new(x, pen.y)));
            }
            b'V' => {
                let y = lexer.number()? + base.y;
                segments.push(Segment::Line(DVec2::new(pen.x, y)));
            }
            b'C' => {
                let c1 = base + lexer.point()?;
                let c2 = base + lexer.point()?;
                let to = base + lexer.point()?;
                next_cubic = Some(c2);
                segments.push(Segment::Cubic(c1, c2, to));
            }
            b'S' => {
                let c1 = cubic_ctrl.map_or(pen, |c| 2.0 * pen - c);
                let c2 = base + lexer.point()?;
                let to = base + lexer.point()?;
                next_cubic = Some(c2);
                segments.push(Segment::Cubic(c1, c2, to));
            }
            b'Q' => {
                let ctrl = base + lexer.point()?;
                let to = base + lexer.point()?;
                next_quad = Some(ctrl);
                segments.push(Segment::Quad(ctrl, to));
            }
            b'T' => {
                let ctrl = quad_ctrl.map_or(pen, |c| 2.0 * pen - c);
                let to = base + lexer.point()?;
                next_quad = Some(ctrl);
                segments.push(Segment::Quad(ctrl, to));
            }
            b'A' => {
                let radii = lexer.point()?;
                let rotation = lexer.number()?;
                let large_arc = lexer.flag()?;
                let sweep = lexer.flag()?;
                let to = base + lexer.point()?;
                segments.extend(arc_to_cubics(pen, radii, rotation, large_arc, sweep, to));
                pen = to;
            }
            b'Z' => {
                if let Some(done) = current.take().filter(|c| !c.segments.is_empty()) {
                    contours.push(done);
                }
                pen = start;
            }
            _ => bail!("unsupported path command {:?}", cmd as char),
        }

        if !segments.is_empty() {
            let contour = current.get_or_insert_with(|| Contour::new(pen));
            if let Some(last) = segments.last() {
                pen = last.end();
            }
            contour.segments.extend(segments);
        }
        cubic_ctrl = next_cubic;
        quad_ctrl = next_quad;
    }

    if let Some(done) = current.filter(|c| !c.segments.is_empty()) {
        contours.push(done);
    }
    Ok(contours)
}

/// Parses a `transform` attribute into one matrix, leftmost outermost.
pub fn parse_transform(src: &str) -> Result<DAffine2> {
    let mut lexer = Lexer::new(src);
    let mut result = DAffine2::IDENTITY;
    while !lexer.at_end() {
        let name_start = lexer.pos;
        while lexer.letter().is_some() {}
        let name = std::str::from_utf8(&lexer.src[name_start..lexer.pos])?.trim();
        lexer.skip_separators();
        ensure!(lexer.peek() == Some(b'('), "expected '(' after {name:?}");
        lexer.pos += 1;

        let mut args = Vec::new();
        loop {
            lexer.skip_separators();
            match lexer.peek() {
                Some(b')') => {
                    lexer.pos += 1;
                    break;
                }
                Some(_) => args.push(lexer.number()?),
                None => bail!("unterminated {name}(...)"),
            }
        }

        let step = match (name, args.as_slice()) {
            ("matrix", &[a, b, c, d, e, f]) => DAffine2::from_cols_array(&[a, b, c, d, e, f]),
            ("translate", &[tx]) => DAffine2::from_translation(DVec2::new(tx, 0.0)),
            ("translate", &[tx, ty]) => DAffine2::from_translation(DVec2::new(tx, ty)),
            ("scale", &[s]) => DAffine2::from_scale(DVec2::splat(s)),
            ("scale", &[sx, sy]) => DAffine2::from_scale(DVec2::new(sx, sy)),
            ("rotate", &[deg]) => DAffine2::from_angle(deg.to_radians()),
            ("rotate", &[deg, cx, cy]) => {
                let pivot = DVec2::new(cx, cy);
                DAffine2::from_translation(pivot)
                    * DAffine2::from_angle(deg.to_radians())
                    * DAffine2::from_translation(-pivot)
            }
            ("skewX", &[deg]) => {
                DAffine2::from_cols(DVec2::X, DVec2::new(deg.to_radians().tan(), 1.0), DVec2::ZERO)
            }
            ("skewY", &[deg]) => {
                DAffine2::from_cols(DVec2::new(1.0, deg.to_radians().tan()), DVec2::Y, DVec2::ZERO)
            }
            _ => bail!("unsupported transform {name}({args:?})"),
        };
        result = result * step;
    }
    Ok(result)
}

struct Tag<'a> {
    name: &'a str,
    attrs: &'a str,
    closing: bool,
    self_closing: bool,
}

/// Element tags in document order. Comments, processing instructions,
/// doctypes and CDATA are skipped.
fn tags(src: &str) -> Vec<Tag<'_>> {
    let mut out = Vec::new();
    let mut cursor = 0;
    while let Some(found) = src[cursor..].find('<') {
        let open = cursor + found;
        let rest = &src[open..];
        let skip_to = |terminator: &str| {
            rest.find(terminator)
                .map_or(src.len(), |end| open + end + terminator.len())
        };
        if rest.starts_with("<!--") {
            cursor = skip_to("-->");
            continue;
        }
        if rest.starts_with("<![CDATA[") {
            cursor = skip_to("]]>");
            continue;
        }
        if rest.starts_with("<?") {
            cursor = skip_to("?>");
            continue;
        }
        if rest.starts_with("<!") {
            cursor = skip_to(">");
            continue;
        }

        // closing '>' outside attribute quotes
        let mut quote = None;
        let mut end = None;
        for (i, c) in rest.char_indices().skip(1) {
            match (quote, c) {
                (None, '"' | '\'') => quote = Some(c),
                (Some(q), c) if c == q => quote = None,
                (None, '>') => {
                    end = Some(i);
                    break;
                }
                _ => {}
            }
        }
        let Some(end) = end else {
            break;
        };
        cursor = open + end + 1;

        let body = &rest[1..end];
        let closing = body.starts_with('/');
        let body = body.trim_start_matches('/');
        let self_closing = body.trim_end().ends_with('/');
        let body = body.trim_end().trim_end_matches('/');
        let name_len = body
            .find(|c: char| c.is_ascii_whitespace())
            .unwrap_or(body.len());
        out.push(Tag {
            name: &body[..name_len],
            attrs: &body[name_len..],
            closing,
            self_closing,
        });
    }
    out
}

/// Value of attribute `key`, quoted or bare.
fn attr<'a>(attrs: &'a str, key: &str) -> Option<&'a str> {
    let bytes = attrs.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let name_start = i;
        while i < bytes.len() && bytes[i] != b'=' && !bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let name = &attrs[name_start..i];
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if bytes.get(i) != Some(&b'=') {
            if name.is_empty() {
                i += 1;
            }
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let (value_start, value_end) = match bytes.get(i) {
            Some(&quote @ (b'"' | b'\'')) => {
                let start = i + 1;
                let len = attrs[start..].find(quote as char)?;
                (start, start + len)
            }
            _ => {
                let len = attrs[i..]
                    .find(|c: char| c.is_ascii_whitespace())
                    .unwrap_or(attrs.len() - i);
                (i, i + len)
            }
        };
        if name == key {
            return Some(&attrs[value_start..value_end]);
        }
        i = value_end + 1;
    }
    None
}

/// Leading number of a length attribute; units are ignored.
fn length(attrs: &str, key: &str) -> Option<f64> {
    let value = attr(attrs, key)?;
    Lexer::new(value).number().ok()
}

fn polygon(points: &str) -> Result<Vec<Contour>> {
    let mut lexer = Lexer::new(points);
    let mut coords = Vec::new();
    while !lexer.at_end() {
        coords.push(lexer.number()?);
    }
    let mut pairs = coords
        .chunks_exact(2)
        .map(|pair| DVec2::new(pair[0], pair[1]));
    let Some(first) = pairs.next() else {
        return Ok(Vec::new());
    };
    let mut contour = Contour::new(first);
    contour.segments.extend(pairs.map(Segment::Line));
    Ok(vec![contour])
}

fn ellipse(center: DVec2, radii: DVec2) -> Vec<Contour> {
    if radii.x <= 0.0 || radii.y <= 0.0 {
        return Vec::new();
    }
    let points = [
        DVec2::new(center.x, center.y + radii.y),
        DVec2::new(center.x - radii.x, center.y),
        DVec2::new(center.x, center.y - radii.y),
        DVec2::new(center.x + radii.x, center.y),
    ];
    let mut contour = Contour::new(DVec2::new(center.x + radii.x, center.y));
    let mut pen = contour.start;
    for to in points {
        contour
            .segments
            .extend(arc_to_cubics(pen, radii, 0.0, false, true, to));
        pen = to;
    }
    vec![contour]
}

fn rect(attrs: &str) -> Vec<Contour> {
    let x = length(attrs, "x").unwrap_or(0.0);
    let y = length(attrs, "y").unwrap_or(0.0);
    let (Some(w), Some(h)) = (length(attrs, "width"), length(attrs, "height")) else {
        return Vec::new();
    };
    if w <= 0.0 || h <= 0.0 {
        return Vec::new();
    }

    let rx = length(attrs, "rx");
    let ry = length(attrs, "ry");
    let radii = match (rx, ry) {
        (None, None) => DVec2::ZERO,
        (Some(r), None) | (None, Some(r)) => DVec2::splat(r),
        (Some(rx), Some(ry)) => DVec2::new(rx, ry),
    }
    .clamp(DVec2::ZERO, DVec2::new(w, h) * 0.5);

    if radii.x == 0.0 || radii.y == 0.0 {
        let mut contour = Contour::new(DVec2::new(x, y));
        contour.segments.extend([
            Segment::Line(DVec2::new(x + w, y)),
            Segment::Line(DVec2::new(x + w, y + h)),
            Segment::Line(DVec2::new(x, y + h)),
        ]);
        return vec![contour];
    }

    let (rx, ry) = (radii.x, radii.y);
    let corners = [
        (DVec2::new(x + w - rx, y), DVec2::new(x + w, y + ry)),
        (DVec2::new(x + w, y + h - ry), DVec2::new(x + w - rx, y + h)),
        (DVec2::new(x + rx, y + h), DVec2::new(x, y + h - ry)),
        (DVec2::new(x, y + ry), DVec2::new(x + rx, y)),
    ];
    let mut contour = Contour::new(DVec2::new(x + rx, y));
    for (line_to, arc_to) in corners {
        contour.segments.push(Segment::Line(line_to));
        contour
            .segments
            .extend(arc_to_cubics(line_to, radii, 0.0, false, true, arc_to));
    }
    vec![contour]
}

fn shape_outline(name: &str, attrs: &str) -> Result<Option<Vec<Contour>>> {
    let contours = match name {
        "path" => match attr(attrs, "d") {
            Some(d) => parse_path_data(d)?,
            None => Vec::new(),
        },
        "polygon" | "polyline" => polygon(attr(attrs, "points").unwrap_or_default())?,
        "rect" => rect(attrs),
        "circle" => {
            let center = DVec2::new(
                length(attrs, "cx").unwrap_or(0.0),
                length(attrs, "cy").unwrap_or(0.0),
            );
            ellipse(center, DVec2::splat(length(attrs, "r").unwrap_or(0.0)))
        }
        "ellipse" => {
            let center = DVec2::new(
                length(attrs, "cx").unwrap_or(0.0),
                length(attrs, "cy").unwrap_or(0.0),
            );
            let radii = DVec2::new(
                length(attrs, "rx").unwrap_or(0.0),
                length(attrs, "ry").unwrap_or(0.0),
            );
            ellipse(center, radii)
        }
        _ => return Ok(None),
    };
    Ok(Some(contours))
}

const HIDDEN_CONTAINERS: &[&str] = &[
    "defs",
    "clipPath",
    "mask",
    "symbol",
    "pattern",
    "marker",
    "style",
    "linearGradient",
    "radialGradient",
    "metadata",
];

struct Open<'a> {
    name: &'a str,
    transform: DAffine2,
    hidden: bool,
}

/// Every filled outline in an SVG document, in user units, with element
/// and group transforms applied. A shape that fails to parse is skipped
/// with a warning.
pub fn parse_svg(src: &str) -> Result<Vec<Contour>> {
    let mut stack: Vec<Open<'_>> = Vec::new();
    let mut contours = Vec::new();
    let mut saw_root = false;

    for tag in tags(src) {
        if tag.closing {
            if let Some(depth) = stack.iter().rposition(|open| open.name == tag.name) {
                stack.truncate(depth);
            }
            continue;
        }
        saw_root |= tag.name == "svg";

        let parent = stack.last();
        let parent_transform = parent.map_or(DAffine2::IDENTITY, |open| open.transform);
        let hidden = parent.is_some_and(|open| open.hidden)
            || HIDDEN_CONTAINERS.contains(&tag.name)
            || attr(tag.attrs, "display") == Some("none");
        let transform = match attr(tag.attrs, "transform").map(parse_transform) {
            Some(Ok(own)) => parent_transform * own,
            Some(Err(err)) => {
                warn!("ignoring <{}> with a bad transform: {err:#}", tag.name);
                if !tag.self_closing {
                    stack.push(Open {
                        name: tag.name,
                        transform: parent_transform,
                        hidden: true,
                    });
                }
                continue;
            }
            None => parent_transform,
        };

        if !hidden {
            match shape_outline(tag.name, tag.attrs) {
                Ok(Some(outline)) => {
                    contours.extend(outline.iter().map(|c| c.transformed(&transform)));
                }
                Ok(None) => {}
                Err(err) => warn!("skipping <{}>: {err:#}", tag.name),
            }
        } else {
            debug!("skipping hidden <{}>", tag.name);
        }

        if !tag.self_closing {
            stack.push(Open {
                name: tag.name,
                transform,
                hidden,
            });
        }
    }

    ensure!(saw_root, "not an SVG document");
    Ok(contours)
}
