//! Screen-space drop targets for the board's columns.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Column, ColumnId};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_squared(self, other: Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn distance(self, other: Point) -> f64 {
        self.distance_squared(other).sqrt()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Half-open containment: the right and bottom edges belong to the neighbour.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x < self.x + self.width
            && point.y >= self.y
            && point.y < self.y + self.height
    }

    pub fn inflate(&self, amount: f64) -> Rect {
        Rect::new(
            self.x - amount,
            self.y - amount,
            self.width + amount * 2.0,
            self.height + amount * 2.0,
        )
    }

    fn is_valid(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|value| value.is_finite())
            && self.width >= 0.0
            && self.height >= 0.0
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LayoutError {
    #[error("pointer position ({x}, {y}) is not a finite coordinate")]
    InvalidPointer { x: f64, y: f64 },
    #[error("drop zone for column `{column_id}` has invalid geometry {rect:?}")]
    InvalidZone { column_id: ColumnId, rect: Rect },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropZone {
    pub column_id: ColumnId,
    pub rect: Rect,
}

/// Column drop targets, rebuilt whenever the board layout changes.
#[derive(Debug, Clone, Default)]
pub struct DropZoneIndex {
    zones: Vec<DropZone>,
    slop: f64,
    layout_epoch: u64,
}

impl DropZoneIndex {
    pub fn new(slop: f64) -> Self {
        Self {
            zones: Vec::new(),
            slop: sanitize_slop(slop),
            layout_epoch: 0,
        }
    }

    /// Replaces every zone. Zones are validated here so hit-tests stay cheap.
    pub fn rebuild(&mut self, zones: Vec<DropZone>) -> Result<(), LayoutError> {
        if let Some(zone) = zones.iter().find(|zone| !zone.rect.is_valid()) {
            return Err(LayoutError::InvalidZone {
                column_id: zone.column_id.clone(),
                rect: zone.rect,
            });
        }
        self.zones = zones;
        self.layout_epoch += 1;
        Ok(())
    }

    /// Lays columns out left to right in equal shares of `viewport`, separated
    /// by `gap` and shifted by the horizontal scroll offset.
    pub fn layout_columns(
        &mut self,
        columns: &[Column],
        viewport: Rect,
        gap: f64,
        scroll_x: f64,
    ) -> Result<(), LayoutError> {
        self.rebuild(column_zones(columns, viewport, gap, scroll_x))
    }

    pub fn clear(&mut self) {
        self.zones.clear();
        self.layout_epoch += 1;
    }

    pub fn zones(&self) -> &[DropZone] {
        &self.zones
    }

    pub fn zone(&self, column_id: &ColumnId) -> Option<&DropZone> {
        self.zones.iter().find(|zone| &zone.column_id == column_id)
    }

    pub fn layout_epoch(&self) -> u64 {
        self.layout_epoch
    }

    pub fn slop(&self) -> f64 {
        self.slop
    }

    /// Column whose zone contains `point`. Overlapping candidates resolve to
    /// the zone whose center is nearest the pointer; exact ties keep layout order.
    pub fn hit_test(&self, point: Point) -> Result<Option<&ColumnId>, LayoutError> {
        if !point.is_finite() {
            return Err(LayoutError::InvalidPointer {
                x: point.x,
                y: point.y,
            });
        }

        let mut best: Option<(f64, &DropZone)> = None;
        for zone in &self.zones {
            if !zone.rect.inflate(self.slop).contains(point) {
                continue;
            }
            let distance = zone.rect.center().distance_squared(point);
            match best {
                Some((best_distance, _)) if best_distance <= distance => {}
                _ => best = Some((distance, zone)),
            }
        }

        Ok(best.map(|(_, zone)| &zone.column_id))
    }
}

pub fn column_zones(columns: &[Column], viewport: Rect, gap: f64, scroll_x: f64) -> Vec<DropZone> {
    if columns.is_empty() || viewport.width <= 0.0 {
        return Vec::new();
    }

    let gap = gap.max(0.0);
    let count = columns.len() as f64;
    let width = ((viewport.width - gap * (count - 1.0)) / count).max(0.0);

    columns
        .iter()
        .enumerate()
        .map(|(idx, column)| DropZone {
            column_id: column.id.clone(),
            rect: Rect::new(
                viewport.x + idx as f64 * (width + gap) - scroll_x,
                viewport.y,
                width,
                viewport.height,
            ),
        })
        .collect()
}

fn sanitize_slop(slop: f64) -> f64 {
    if slop.is_finite() { slop.max(0.0) } else { 0.0 }
}
