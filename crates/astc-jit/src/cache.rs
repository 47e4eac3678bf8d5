//! Cache de code natif indexé par hash de contenu.
//!
//! Une entrée garde une copie du bytecode source : une collision de hash ne
//! sert jamais le code d'un autre programme. Au-delà de la capacité, l'entrée
//! la moins récemment utilisée est évincée.

use std::{collections::HashMap, time::Instant};

use astc_core::{content_hash, Arch};
use astc_mm::{GenArena, Handle};
use smallvec::SmallVec;
use tracing::{debug, trace};

/// Fonction de hash du contenu (injectable pour forcer des collisions).
pub type ContentHasher = fn(&[u8]) -> u64;

/// Une entrée : code natif compilé pour `(arch, source)`.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    key: u64,
    arch: Arch,
    source: Box<[u8]>,
    code: Box<[u8]>,
    access_count: u64,
    last_tick: u64,
    last_access: Instant,
}

impl CacheEntry {
    pub const fn key(&self) -> u64 {
        self.key
    }
    pub const fn arch(&self) -> Arch {
        self.arch
    }
    pub fn source(&self) -> &[u8] {
        &self.source
    }
    pub fn code(&self) -> &[u8] {
        &self.code
    }
    pub fn size(&self) -> usize {
        self.code.len()
    }
    pub const fn access_count(&self) -> u64 {
        self.access_count
    }
    pub const fn last_access(&self) -> Instant {
        self.last_access
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
    /// Sondes tombées sur un bucket occupé par un autre contenu.
    pub collisions: u64,
}

pub struct CodeCache {
    entries: GenArena<CacheEntry>,
    index: HashMap<(Arch, u64), SmallVec<[Handle; 2]>>,
    capacity: usize,
    tick: u64,
    hasher: ContentHasher,
    stats: CacheStats,
}

impl std::fmt::Debug for CodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.capacity)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Default for CodeCache {
    fn default() -> Self {
        Self::with_capacity(1024)
    }
}

impl CodeCache {
    /// Cache FNV-1a de `capacity` entrées (0 : cache désactivé).
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_hasher(capacity, content_hash)
    }

    pub fn with_hasher(capacity: usize, hasher: ContentHasher) -> Self {
        Self {
            entries: GenArena::with_capacity(capacity.min(1024)),
            index: HashMap::new(),
            capacity,
            tick: 0,
            hasher,
            stats: CacheStats::default(),
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub const fn stats(&self) -> CacheStats {
        CacheStats { entries: self.entries.len(), ..self.stats }
    }

    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.iter().map(|(_, e)| e)
    }

    fn find(&self, arch: Arch, key: u64, source: &[u8]) -> (Option<Handle>, bool) {
        let Some(bucket) = self.index.get(&(arch, key)) else {
            return (None, false);
        };
        let hit = bucket
            .iter()
            .copied()
            .find(|&h| self.entries.get(h).is_some_and(|e| *e.source == *source));
        (hit, !bucket.is_empty())
    }

    /// Vrai si `(arch, source)` est en cache ; ne touche ni LRU ni stats.
    pub fn contains(&self, arch: Arch, source: &[u8]) -> bool {
        self.find(arch, (self.hasher)(source), source).0.is_some()
    }

    /// Code natif en cache, sans toucher à la LRU ni aux stats.
    pub fn peek(&self, arch: Arch, source: &[u8]) -> Option<&[u8]> {
        let (h, _) = self.find(arch, (self.hasher)(source), source);
        self.entries.get(h?).map(|e| &e.code[..])
    }

    /// Code natif pour `(arch, source)` ; rafraîchit l'entrée pour la LRU.
    pub fn lookup(&mut self, arch: Arch, source: &[u8]) -> Option<&[u8]> {
        let key = (self.hasher)(source);
        let (found, occupied) = self.find(arch, key, source);
        let Some(h) = found else {
            self.stats.misses += 1;
            if occupied {
                self.stats.collisions += 1;
                debug!(target: "astc::cache", key = format_args!("{key:016x}"), %arch, "collision de hash");
            }
            return None;
        };
        self.tick += 1;
        self.stats.hits += 1;
        let tick = self.tick;
        let entry = self.entries.get_mut(h)?;
        entry.access_count += 1;
        entry.last_tick = tick;
        entry.last_access = Instant::now();
        trace!(target: "astc::cache", key = format_args!("{key:016x}"), %arch, hits = entry.access_count, "hit");
        Some(&entry.code[..])
    }

    /// Insère (ou remplace) le code de `(arch, source)`.
    pub fn insert(&mut self, arch: Arch, source: &[u8], code: &[u8]) {
        if self.capacity == 0 {
            return;
        }
        let key = (self.hasher)(source);
        self.tick += 1;
        if let (Some(h), _) = self.find(arch, key, source) {
            if let Some(e) = self.entries.get_mut(h) {
                e.code = code.into();
                e.last_tick = self.tick;
                e.last_access = Instant::now();
            }
            return;
        }
        while self.entries.len() >= self.capacity {
            if !self.evict_lru() {
                break;
            }
        }
        let entry = CacheEntry {
            key,
            arch,
            source: source.into(),
            code: code.into(),
            access_count: 0,
            last_tick: self.tick,
            last_access: Instant::now(),
        };
        let h = self.entries.insert(entry);
        self.index.entry((arch, key)).or_default().push(h);
        self.stats.insertions += 1;
        trace!(target: "astc::cache", key = format_args!("{key:016x}"), %arch, size = code.len(), "insert");
    }

    fn evict_lru(&mut self) -> bool {
        let Some((h, arch, key)) = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_tick)
            .map(|(h, e)| (h, e.arch, e.key))
        else {
            return false;
        };
        self.entries.remove(h);
        if let Some(bucket) = self.index.get_mut(&(arch, key)) {
            bucket.retain(|x| *x != h);
            if bucket.is_empty() {
                self.index.remove(&(arch, key));
            }
        }
        self.stats.evictions += 1;
        debug!(target: "astc::cache", key = format_args!("{key:016x}"), %arch, "éviction LRU");
        true
    }

    /// Vide le cache (les compteurs sont conservés).
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}
