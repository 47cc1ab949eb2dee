//! Pointer and touch tracking in normalized surface coordinates.

/// Identifier used for the mouse; touches use their own identifiers.
pub const MOUSE_POINTER_ID: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down { id: i64, x: f32, y: f32 },
    Move { id: i64, x: f32, y: f32 },
    Up { id: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pointer {
    pub id: i64,
    /// Position with the origin at the bottom-left, 0..1 on both axes.
    pub texcoord: [f32; 2],
    pub prev_texcoord: [f32; 2],
    /// Aspect-corrected movement since the previous event.
    pub delta: [f32; 2],
    pub down: bool,
    pub moved: bool,
    pub color: [f32; 3],
}

impl Pointer {
    fn new(id: i64) -> Self {
        Self {
            id,
            texcoord: [0.0; 2],
            prev_texcoord: [0.0; 2],
            delta: [0.0; 2],
            down: false,
            moved: false,
            color: [30.0, 0.0, 300.0],
        }
    }
}

/// Scales a horizontal texcoord delta so both axes move at screen speed.
pub fn correct_delta_x(delta: f32, aspect_ratio: f32) -> f32 {
    if aspect_ratio < 1.0 {
        delta * aspect_ratio
    } else {
        delta
    }
}

pub fn correct_delta_y(delta: f32, aspect_ratio: f32) -> f32 {
    if aspect_ratio > 1.0 {
        delta / aspect_ratio
    } else {
        delta
    }
}

#[derive(Debug, Clone, Default)]
pub struct Pointers {
    pointers: Vec<Pointer>,
}

impl Pointers {
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Pointer> {
        self.pointers.iter_mut()
    }

    pub fn get(&self, id: i64) -> Option<&Pointer> {
        self.pointers.iter().find(|p| p.id == id)
    }

    fn entry(&mut self, id: i64) -> &mut Pointer {
        match self.pointers.iter().position(|p| p.id == id) {
            Some(index) => &mut self.pointers[index],
            None => {
                self.pointers.push(Pointer::new(id));
                let last = self.pointers.len() - 1;
                &mut self.pointers[last]
            }
        }
    }

    /// Released touches are dropped once their last movement has been taken.
    /// The mouse entry stays so it keeps its color between presses.
    fn prune(&mut self) {
        self.pointers.retain(|p| p.id == MOUSE_POINTER_ID || p.down || p.moved);
    }

    /// Applies an event given in pixels on a `width` x `height` surface.
    ///
    /// `color` is only consulted on `Down`, where the pointer takes a fresh color.
    pub fn handle(&mut self, event: PointerEvent, width: u32, height: u32, color: impl FnOnce() -> [f32; 3]) {
        let width = width.max(1) as f32;
        let height = height.max(1) as f32;
        let aspect_ratio = width / height;
        match event {
            PointerEvent::Down { id, x, y } => {
                let pointer = self.entry(id);
                pointer.down = true;
                pointer.moved = false;
                pointer.texcoord = [x / width, 1.0 - y / height];
                pointer.prev_texcoord = pointer.texcoord;
                pointer.delta = [0.0; 2];
                pointer.color = color();
            }
            PointerEvent::Move { id, x, y } => {
                let Some(pointer) = self.pointers.iter_mut().find(|p| p.id == id && p.down) else {
                    return;
                };
                pointer.prev_texcoord = pointer.texcoord;
                pointer.texcoord = [x / width, 1.0 - y / height];
                pointer.delta = [
                    correct_delta_x(pointer.texcoord[0] - pointer.prev_texcoord[0], aspect_ratio),
                    correct_delta_y(pointer.texcoord[1] - pointer.prev_texcoord[1], aspect_ratio),
                ];
                pointer.moved = pointer.delta[0].abs() > 0.0 || pointer.delta[1].abs() > 0.0;
            }
            PointerEvent::Up { id } => {
                if let Some(pointer) = self.pointers.iter_mut().find(|p| p.id == id) {
                    pointer.down = false;
                }
                self.prune();
            }
        }
    }

    /// Hands out pointers that moved since the last call, clearing their flag.
    pub fn take_moved(&mut self) -> Vec<Pointer> {
        let mut moved = Vec::new();
        for pointer in self.pointers.iter_mut().filter(|p| p.moved) {
            pointer.moved = false;
            moved.push(pointer.clone());
        }
        self.prune();
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: [f32; 3] = [1.0, 0.0, 0.0];

    #[test]
    fn down_flips_y_and_resets_delta() {
        let mut pointers = Pointers::default();
        pointers.handle(PointerEvent::Down { id: MOUSE_POINTER_ID, x: 50.0, y: 25.0 }, 100, 100, || RED);
        let p = pointers.get(MOUSE_POINTER_ID).unwrap();
        assert_eq!(p.texcoord, [0.5, 0.75]);
        assert_eq!(p.delta, [0.0, 0.0]);
        assert!(p.down && !p.moved);
        assert_eq!(p.color, RED);
    }

    #[test]
    fn move_on_landscape_surface_shrinks_vertical_delta() {
        let mut pointers = Pointers::default();
        pointers.handle(PointerEvent::Down { id: 3, x: 0.0, y: 100.0 }, 200, 100, || RED);
        pointers.handle(PointerEvent::Move { id: 3, x: 20.0, y: 90.0 }, 200, 100, || RED);
        let p = pointers.get(3).unwrap();
        assert!((p.delta[0] - 0.1).abs() < 1e-6);
        assert!((p.delta[1] - 0.05).abs() < 1e-6);
        assert!(p.moved);
    }

    #[test]
    fn move_without_press_is_ignored() {
        let mut pointers = Pointers::default();
        pointers.handle(PointerEvent::Move { id: 1, x: 20.0, y: 90.0 }, 200, 100, || RED);
        assert!(pointers.take_moved().is_empty());
        assert!(pointers.get(1).is_none());
    }

    #[test]
    fn take_moved_clears_the_flag() {
        let mut pointers = Pointers::default();
        pointers.handle(PointerEvent::Down { id: 1, x: 10.0, y: 10.0 }, 100, 100, || RED);
        pointers.handle(PointerEvent::Move { id: 1, x: 20.0, y: 10.0 }, 100, 100, || RED);
        assert_eq!(pointers.take_moved().len(), 1);
        assert!(pointers.take_moved().is_empty());
        pointers.handle(PointerEvent::Up { id: 1 }, 100, 100, || RED);
        assert!(pointers.get(1).is_none());
    }

    #[test]
    fn released_touches_leave_the_table() {
        let mut pointers = Pointers::default();
        pointers.handle(PointerEvent::Down { id: MOUSE_POINTER_ID, x: 1.0, y: 1.0 }, 100, 100, || RED);
        pointers.handle(PointerEvent::Up { id: MOUSE_POINTER_ID }, 100, 100, || RED);
        for id in 0..10_000 {
            pointers.handle(PointerEvent::Down { id, x: 5.0, y: 5.0 }, 100, 100, || RED);
            pointers.handle(PointerEvent::Up { id }, 100, 100, || RED);
        }
        pointers.handle(PointerEvent::Move { id: 20_000, x: 5.0, y: 5.0 }, 100, 100, || RED);

        assert_eq!(pointers.pointers.len(), 1);
        let mouse = pointers.get(MOUSE_POINTER_ID).unwrap();
        assert!(!mouse.down);
        assert_eq!(mouse.color, RED);
    }

    #[test]
    fn touch_released_mid_drag_still_splats_once() {
        let mut pointers = Pointers::default();
        pointers.handle(PointerEvent::Down { id: 4, x: 10.0, y: 10.0 }, 100, 100, || RED);
        pointers.handle(PointerEvent::Move { id: 4, x: 30.0, y: 10.0 }, 100, 100, || RED);
        pointers.handle(PointerEvent::Up { id: 4 }, 100, 100, || RED);

        let moved = pointers.take_moved();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].id, 4);
        assert!(pointers.get(4).is_none());
    }

    #[test]
    fn delta_correction_depends_on_orientation() {
        assert_eq!(correct_delta_x(0.2, 0.5), 0.1);
        assert_eq!(correct_delta_x(0.2, 2.0), 0.2);
        assert_eq!(correct_delta_y(0.2, 2.0), 0.1);
        assert_eq!(correct_delta_y(0.2, 0.5), 0.2);
    }
}
