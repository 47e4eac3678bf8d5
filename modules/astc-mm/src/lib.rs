//! astc-mm : **handles générationnels** pour astc
//!
//! [`GenArena<T>`] stocke des valeurs derrière des [`Handle`] stables tant que
//! l'élément vit ; un handle retiré ne résout plus jamais (génération bumpée),
//! même si son slot est réutilisé. Le cache de code y range ses entrées et
//! n'indexe que des handles.
//!
//! ```ignore
//! use astc_mm::*;
//! let mut arena = GenArena::<String>::new();
//! let h = arena.insert("hello".to_string());
//! assert_eq!(arena.get(h).unwrap(), "hello");
//! arena.remove(h);
//! assert!(arena.get(h).is_none());
//! ```

use core::fmt;

// ───────────────────────── Handles générationnels ─────────────────────────

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Handle {
    idx: u32,
    gen: u32,
}

impl Handle {
    pub const fn new(idx: u32, gen: u32) -> Self {
        Self { idx, gen }
    }
    pub const fn index(self) -> u32 {
        self.idx
    }
    pub const fn generation(self) -> u32 {
        self.gen
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h#{}@{}", self.idx, self.gen)
    }
}

#[derive(Clone, Debug)]
enum Slot<T> {
    Occupied { gen: u32, val: T },
    /// Maillon de la free-list.
    Vacant { gen: u32, next: Option<u32> },
}

impl<T> Slot<T> {
    const fn gen(&self) -> u32 {
        match self {
            Self::Occupied { gen, .. } | Self::Vacant { gen, .. } => *gen,
        }
    }
}

/// Arène à handles générationnels.
#[derive(Clone, Debug)]
pub struct GenArena<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
}

impl<T> Default for GenArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> GenArena<T> {
    pub const fn new() -> Self {
        Self { slots: Vec::new(), free_head: None, len: 0 }
    }

    pub fn with_capacity(n: usize) -> Self {
        Self { slots: Vec::with_capacity(n), free_head: None, len: 0 }
    }

    /// Nombre de slots (vivants + libres).
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insère `v`, en réutilisant un slot libre si possible.
    ///
    /// # Panics
    /// Au-delà de `u32::MAX` slots.
    pub fn insert(&mut self, v: T) -> Handle {
        self.len += 1;
        if let Some(idx) = self.free_head {
            let slot = &mut self.slots[idx as usize];
            let gen = slot.gen();
            if let Slot::Vacant { next, .. } = *slot {
                self.free_head = next;
            }
            *slot = Slot::Occupied { gen, val: v };
            return Handle::new(idx, gen);
        }
        let idx = u32::try_from(self.slots.len()).expect("GenArena: plus de u32::MAX slots");
        self.slots.push(Slot::Occupied { gen: 0, val: v });
        Handle::new(idx, 0)
    }

    pub fn contains(&self, h: Handle) -> bool {
        self.get(h).is_some()
    }

    pub fn get(&self, h: Handle) -> Option<&T> {
        match self.slots.get(h.idx as usize)? {
            Slot::Occupied { gen, val } if *gen == h.gen => Some(val),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, h: Handle) -> Option<&mut T> {
        match self.slots.get_mut(h.idx as usize)? {
            Slot::Occupied { gen, val } if *gen == h.gen => Some(val),
            _ => None,
        }
    }

    /// Retire l'élément ; le handle (et ses copies) devient invalide.
    pub fn remove(&mut self, h: Handle) -> Option<T> {
        let slot = self.slots.get_mut(h.idx as usize)?;
        if !matches!(slot, Slot::Occupied { gen, .. } if *gen == h.gen) {
            return None;
        }
        let vacant = Slot::Vacant { gen: h.gen.wrapping_add(1), next: self.free_head };
        let Slot::Occupied { val, .. } = core::mem::replace(slot, vacant) else {
            return None;
        };
        self.free_head = Some(h.idx);
        self.len -= 1;
        Some(val)
    }

    /// Retire tout ; les handles émis restent invalides.
    pub fn clear(&mut self) {
        let handles: Vec<Handle> = self.iter().map(|(h, _)| h).collect();
        for h in handles {
            self.remove(h);
        }
    }

    /// Garde les éléments pour lesquels `keep` renvoie vrai.
    pub fn retain(&mut self, mut keep: impl FnMut(Handle, &T) -> bool) {
        let doomed: Vec<Handle> = self.iter().filter(|(h, v)| !keep(*h, v)).map(|(h, _)| h).collect();
        for h in doomed {
            self.remove(h);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots.iter().zip(0u32..).filter_map(|(s, i)| match s {
            Slot::Occupied { gen, val } => Some((Handle::new(i, *gen), val)),
            Slot::Vacant { .. } => None,
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle, &mut T)> {
        self.slots.iter_mut().zip(0u32..).filter_map(|(s, i)| match s {
            Slot::Occupied { gen, val } => Some((Handle::new(i, *gen), val)),
            Slot::Vacant { .. } => None,
        })
    }
}

// ───────────────────────────── Tests ─────────────────────────────
