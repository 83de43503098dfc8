use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid color: {0:?}")]
pub struct ColorError(pub String);

/// 8-bit RGBA color used for highlight rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba {
  pub r: u8,
  pub g: u8,
  pub b: u8,
  pub a: u8,
}

impl Rgba {
  pub const YELLOW: Rgba = Rgba::rgb(0xff, 0xff, 0x00);
  pub const RED: Rgba = Rgba::rgb(0xff, 0x00, 0x00);
  pub const BLACK: Rgba = Rgba::rgb(0x00, 0x00, 0x00);
  pub const WHITE: Rgba = Rgba::rgb(0xff, 0xff, 0xff);

  pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
    Self { r, g, b, a: 0xff }
  }

  /// Accepts `#rgb`, `#rrggbb`, `#rrggbbaa`, `0xrrggbb[aa]`, `rgb(r,g,b)`, `rgba(r,g,b,a)` with
  /// alpha in `0..=1`, and a handful of CSS color names.
  pub fn parse(input: &str) -> Result<Self, ColorError> {
    let s = input.trim().to_ascii_lowercase();
    let err = || ColorError(input.to_string());

    if let Some(hex) = s.strip_prefix('#').or_else(|| s.strip_prefix("0x")) {
      return parse_hex(hex).ok_or_else(err);
    }
    if let Some(body) = s.strip_prefix("rgba(").and_then(|r| r.strip_suffix(')')) {
      let parts: Vec<&str> = body.split(',').map(str::trim).collect();
      if parts.len() != 4 {
        return Err(err());
      }
      let alpha: f64 = parts[3].parse().map_err(|_| err())?;
      if !(0.0..=1.0).contains(&alpha) {
        return Err(err());
      }
      return Ok(Self {
        r: parts[0].parse().map_err(|_| err())?,
        g: parts[1].parse().map_err(|_| err())?,
        b: parts[2].parse().map_err(|_| err())?,
        a: (alpha * 255.0).round() as u8,
      });
    }
    if let Some(body) = s.strip_prefix("rgb(").and_then(|r| r.strip_suffix(')')) {
      let parts: Vec<&str> = body.split(',').map(str::trim).collect();
      if parts.len() != 3 {
        return Err(err());
      }
      return Ok(Self::rgb(
        parts[0].parse().map_err(|_| err())?,
        parts[1].parse().map_err(|_| err())?,
        parts[2].parse().map_err(|_| err())?,
      ));
    }
    named(&s).ok_or_else(err)
  }

  /// `#rrggbb`, or `#rrggbbaa` when not fully opaque.
  pub fn to_hex(&self) -> String {
    if self.a == 0xff {
      format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    } else {
      format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }
  }

  pub fn to_css_rgba(&self) -> String {
    format!(
      "rgba({},{},{},{:.2})",
      self.r,
      self.g,
      self.b,
      f64::from(self.a) / 255.0
    )
  }

  /// Black or white, whichever reads better on top of this color.
  pub fn contrast_text(&self) -> Rgba {
    let brightness =
      0.2126 * f64::from(self.r) + 0.7152 * f64::from(self.g) + 0.0722 * f64::from(self.b);
    if brightness < 127.5 {
      Rgba::WHITE
    } else {
      Rgba::BLACK
    }
  }
}

impl Default for Rgba {
  fn default() -> Self {
    Rgba::YELLOW
  }
}

impl fmt::Display for Rgba {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.to_hex())
  }
}

impl FromStr for Rgba {
  type Err = ColorError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Rgba::parse(s)
  }
}

impl Serialize for Rgba {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.to_hex())
  }
}

impl<'de> Deserialize<'de> for Rgba {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let s = String::deserialize(deserializer)?;
    Rgba::parse(&s).map_err(serde::de::Error::custom)
  }
}

fn parse_hex(hex: &str) -> Option<Rgba> {
  if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
    return None;
  }
  let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
  match hex.len() {
    3 => {
      let nib = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
      Some(Rgba::rgb(nib(0)?, nib(1)?, nib(2)?))
    }
    6 => Some(Rgba::rgb(byte(0)?, byte(2)?, byte(4)?)),
    8 => Some(Rgba {
      r: byte(0)?,
      g: byte(2)?,
      b: byte(4)?,
      a: byte(6)?,
    }),
    _ => None,
  }
}

fn named(name: &str) -> Option<Rgba> {
  let c = match name {
    "black" => Rgba::BLACK,
    "white" => Rgba::WHITE,
    "red" => Rgba::RED,
    "yellow" => Rgba::YELLOW,
    "green" => Rgba::rgb(0x00, 0x80, 0x00),
    "lime" => Rgba::rgb(0x00, 0xff, 0x00),
    "blue" => Rgba::rgb(0x00, 0x00, 0xff),
    "orange" => Rgba::rgb(0xff, 0xa5, 0x00),
    "cyan" | "aqua" => Rgba::rgb(0x00, 0xff, 0xff),
    "magenta" | "fuchsia" => Rgba::rgb(0xff, 0x00, 0xff),
    "gray" | "grey" => Rgba::rgb(0x80, 0x80, 0x80),
    "pink" => Rgba::rgb(0xff, 0xc0, 0xcb),
    "transparent" => Rgba {
      r: 0,
      g: 0,
      b: 0,
      a: 0,
    },
    _ => return None,
  };
  Some(c)
}
