//! Cell grid: resources, occupancy and per-team fog of war.

use serde::{Deserialize, Serialize};

use crate::components::{Field, UnitId};
use crate::math::GridPos;
use crate::tech::ResourceTypeId;

/// Most teams a map tracks fog of war for.
pub const MAX_TEAMS: usize = 32;

/// A resource deposit on a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resource {
    /// Resource type.
    pub resource_type: ResourceTypeId,
    /// Amount left.
    pub amount: i64,
}

/// One map cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    /// Resource deposit, if any.
    pub resource: Option<Resource>,
    explored: u32,
    visible: u32,
    land: Option<UnitId>,
    air: Option<UnitId>,
}

fn team_bit(team: usize) -> u32 {
    if team < MAX_TEAMS {
        1 << team
    } else {
        0
    }
}

/// The playing field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Map {
    width: i32,
    height: i32,
    cells: Vec<Cell>,
    start_locations: Vec<GridPos>,
}

impl Map {
    /// Create an empty map.
    #[must_use]
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            cells: vec![Cell::default(); (width * height) as usize],
            start_locations: Vec::new(),
        }
    }

    /// Width in cells.
    #[must_use]
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Height in cells.
    #[must_use]
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Whether `pos` lies on the map.
    #[must_use]
    pub fn is_inside(&self, pos: GridPos) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width && pos.y < self.height
    }

    fn index(&self, pos: GridPos) -> Option<usize> {
        self.is_inside(pos)
            .then(|| (pos.y * self.width + pos.x) as usize)
    }

    /// Cell at `pos`.
    #[must_use]
    pub fn cell(&self, pos: GridPos) -> Option<&Cell> {
        self.index(pos).map(|i| &self.cells[i])
    }

    fn cell_mut(&mut self, pos: GridPos) -> Option<&mut Cell> {
        self.index(pos).map(move |i| &mut self.cells[i])
    }

    /// Register a start location; returns its index.
    pub fn add_start_location(&mut self, pos: GridPos) -> usize {
        self.start_locations.push(pos);
        self.start_locations.len() - 1
    }

    /// Start location by index.
    #[must_use]
    pub fn start_location(&self, index: usize) -> Option<GridPos> {
        self.start_locations.get(index).copied()
    }

    /// Number of players the map was made for.
    #[must_use]
    pub fn max_players(&self) -> usize {
        self.start_locations.len()
    }

    /// Resource deposit at `pos`.
    #[must_use]
    pub fn resource_at(&self, pos: GridPos) -> Option<&Resource> {
        self.cell(pos).and_then(|c| c.resource.as_ref())
    }

    /// Put a resource deposit on a cell, replacing any existing one.
    pub fn place_resource(&mut self, pos: GridPos, resource_type: ResourceTypeId, amount: i64) {
        if let Some(cell) = self.cell_mut(pos) {
            cell.resource = Some(Resource {
                resource_type,
                amount,
            });
        }
    }

    /// Take up to `amount` from a deposit; removes the deposit when empty.
    pub fn take_resource(&mut self, pos: GridPos, amount: i64) -> i64 {
        let Some(cell) = self.cell_mut(pos) else {
            return 0;
        };
        let Some(resource) = cell.resource.as_mut() else {
            return 0;
        };
        let taken = amount.min(resource.amount);
        resource.amount -= taken;
        if resource.amount <= 0 {
            cell.resource = None;
        }
        taken
    }

    /// Unit standing on `pos` in `field`.
    #[must_use]
    pub fn occupant(&self, pos: GridPos, field: Field) -> Option<UnitId> {
        let cell = self.cell(pos)?;
        match field {
            Field::Land => cell.land,
            Field::Air => cell.air,
        }
    }

    /// Set or clear the occupant of a cell.
    pub fn set_occupant(&mut self, pos: GridPos, field: Field, unit: Option<UnitId>) {
        if let Some(cell) = self.cell_mut(pos) {
            match field {
                Field::Land => cell.land = unit,
                Field::Air => cell.air = unit,
            }
        }
    }

    /// A cell a unit of `field` could enter.
    #[must_use]
    pub fn is_free_cell(&self, pos: GridPos, field: Field) -> bool {
        match self.cell(pos) {
            None => false,
            Some(cell) => match field {
                Field::Land => cell.land.is_none() && cell.resource.is_none(),
                Field::Air => cell.air.is_none(),
            },
        }
    }

    /// Whether the `size`×`size` square with top-left `pos` is free.
    #[must_use]
    pub fn is_free_cells(&self, pos: GridPos, size: i32, field: Field) -> bool {
        (0..size).all(|dx| {
            (0..size).all(|dy| self.is_free_cell(pos + GridPos::new(dx, dy), field))
        })
    }

    /// Whether `team` has ever seen `pos`.
    #[must_use]
    pub fn is_explored(&self, pos: GridPos, team: usize) -> bool {
        self.cell(pos)
            .is_some_and(|c| c.explored & team_bit(team) != 0)
    }

    /// Whether `team` currently sees `pos`.
    #[must_use]
    pub fn is_visible(&self, pos: GridPos, team: usize) -> bool {
        self.cell(pos).is_some_and(|c| c.visible & team_bit(team) != 0)
    }

    /// Forget current visibility for every team; exploration is kept.
    pub fn clear_visibility(&mut self) {
        for cell in &mut self.cells {
            cell.visible = 0;
        }
    }

    /// Mark every cell within `radius` of `center` as seen by `team`.
    pub fn reveal(&mut self, center: GridPos, radius: i32, team: usize) {
        let bit = team_bit(team);
        let r_sq = i64::from(radius) * i64::from(radius);
        for x in center.x - radius..=center.x + radius {
            for y in center.y - radius..=center.y + radius {
                let pos = GridPos::new(x, y);
                if pos.distance_squared(center) > r_sq {
                    continue;
                }
                if let Some(cell) = self.cell_mut(pos) {
                    cell.visible |= bit;
                    cell.explored |= bit;
                }
            }
        }
    }
}
