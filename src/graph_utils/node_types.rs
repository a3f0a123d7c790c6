use once_cell::sync::Lazy;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TYPE_ID: &str = "information";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeType {
    pub id: String,
    pub name: String,
    // CSS-style color: "#rrggbb" or "hsl(h, s%, l%)"
    pub color: String,
}

#[derive(Clone, Debug, Default)]
pub struct NodeTypeUpdate {
    pub name: Option<String>,
    pub color: Option<String>,
}

// Last-resort type when even the default type was removed from the catalog
pub(crate) static FALLBACK_TYPE: Lazy<NodeType> = Lazy::new(|| NodeType {
    id: DEFAULT_TYPE_ID.to_string(),
    name: "Information".to_string(),
    color: "#6B7280".to_string(),
});

impl NodeType {
    pub fn new(id: &str, name: &str, color: &str) -> Self {
        Self { id: id.to_string(), name: name.to_string(), color: color.to_string() }
    }

    /// Derive a type from a markup prefix: lowercase id, capitalized name, random color.
    pub fn from_prefix(prefix: &str) -> Self {
        let trimmed = prefix.trim();
        let mut chars = trimmed.chars();
        let name = match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        };
        Self {
            id: trimmed.to_lowercase(),
            name,
            color: random_hsl_color(),
        }
    }
}

pub fn builtin_node_types() -> Vec<NodeType> {
    vec![
        NodeType::new("information", "Information", "#6C5B7B"),
        NodeType::new("task", "Task", "#FF6B6B"),
        NodeType::new("idea", "Idea", "#4ECDC4"),
        NodeType::new("resource", "Resource", "#45B7D1"),
        NodeType::new("condition", "Condition", "#96CEB4"),
        NodeType::new("milestone", "Milestone", "#FFB347"),
        NodeType::new("goal", "Goal", "#9B59B6"),
        NodeType::new("note", "Note", "#F1C40F"),
    ]
}

// Saturation and lightness are kept in a band that stays readable under white label text.
pub fn random_hsl_color() -> String {
    let mut rng = rand::thread_rng();
    let hue: u32 = rng.gen_range(0..360);
    let saturation: u32 = rng.gen_range(60..80);
    let lightness: u32 = rng.gen_range(35..55);
    format!("hsl({}, {}%, {}%)", hue, saturation, lightness)
}

/// Parse a CSS-style color into RGB. Supports `#rgb`, `#rrggbb` and `hsl(h, s%, l%)`.
pub fn parse_css_color(s: &str) -> Option<(u8, u8, u8)> {
    let t = s.trim();
    if let Some(hex) = t.strip_prefix('#') {
        return match hex.len() {
            6 => {
                let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
                let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
                let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
                Some((r, g, b))
            }
            3 => {
                let mut out = [0u8; 3];
                for (i, ch) in hex.chars().enumerate() {
                    let v = ch.to_digit(16)? as u8;
                    out[i] = v * 17;
                }
                Some((out[0], out[1], out[2]))
            }
            _ => None,
        };
    }
    let lower = t.to_lowercase();
    let inner = lower.strip_prefix("hsl(")?.strip_suffix(')')?;
    let parts: Vec<&str> = inner.split(',').map(|p| p.trim()).collect();
    if parts.len() != 3 {
        return None;
    }
    let h: f32 = parts[0].trim_end_matches("deg").parse().ok()?;
    let s: f32 = parts[1].trim_end_matches('%').parse().ok()?;
    let l: f32 = parts[2].trim_end_matches('%').parse().ok()?;
    Some(hsl_to_rgb(h, s / 100.0, l / 100.0))
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (u8, u8, u8) {
    let h = h.rem_euclid(360.0) / 360.0;
    let s = s.clamp(0.0, 1.0);
    let l = l.clamp(0.0, 1.0);
    if s == 0.0 {
        let v = (l * 255.0).round() as u8;
        return (v, v, v);
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let channel = |mut t: f32| -> u8 {
        if t < 0.0 { t += 1.0; }
        if t > 1.0 { t -= 1.0; }
        let v = if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        };
        (v * 255.0).round().clamp(0.0, 255.0) as u8
    };
    (channel(h + 1.0 / 3.0), channel(h), channel(h - 1.0 / 3.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_types_are_lowercase_and_capitalized() {
        let t = NodeType::from_prefix("tension");
        assert_eq!(t.id, "tension");
        assert_eq!(t.name, "Tension");
        assert!(t.color.starts_with("hsl("));
        assert!(parse_css_color(&t.color).is_some());
    }

    #[test]
    fn parses_hex_and_hsl() {
        assert_eq!(parse_css_color("#FF6B6B"), Some((0xff, 0x6b, 0x6b)));
        assert_eq!(parse_css_color("#fff"), Some((255, 255, 255)));
        assert_eq!(parse_css_color("hsl(0, 100%, 50%)"), Some((255, 0, 0)));
        assert_eq!(parse_css_color("hsl(120, 100%, 50%)"), Some((0, 255, 0)));
        assert_eq!(parse_css_color("rebeccapurple"), None);
    }
}
