use std::{borrow::Cow, collections::HashMap};

/// Property names commonly found in object definitions.
const KNOWN_NAMES: &[&str] = &[
    "AddHealth",
    "AddShield",
    "AimerNodeName",
    "AmmoPerShot",
    "AnimationName",
    "AnimatorName",
    "ChunkGeometryName",
    "ClassLabel",
    "CollisionScale",
    "Damage",
    "DestroyedGeometryName",
    "ExplosionName",
    "FireAnim",
    "FireSound",
    "FirstPersonFX",
    "GeometryName",
    "GeometryScale",
    "HealthType",
    "HUDTag",
    "IconTexture",
    "LifeSpan",
    "LightColor",
    "LightRadius",
    "MapTexture",
    "MaxDamage",
    "MaxHealth",
    "MaxShield",
    "MaxSpeed",
    "MuzzleFlash",
    "OrdnanceName",
    "OverrideTexture",
    "PhysicsMass",
    "RoundsPerClip",
    "ScopeTexture",
    "ShotDelay",
    "SoldierCollision",
    "SoundProperty",
    "TargetableCollision",
    "UnitType",
    "Velocity",
    "VehicleCollision",
    "WeaponName",
];

/// 32-bit FNV-1a over the name, case-folded by setting bit 0x20 on every byte.
pub const fn fnv1a_hash(name: &str) -> u32 {
    let bytes = name.as_bytes();
    let mut hash = 2166136261u32;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= (bytes[i] | 0x20) as u32;
        hash = hash.wrapping_mul(16777619);
        i += 1;
    }
    hash
}

/// Resolves property name hashes back to names.
#[derive(Clone, Debug)]
pub struct SymbolTable {
    names: HashMap<u32, String>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        let mut table = Self { names: HashMap::new() };
        table.extend(KNOWN_NAMES.iter().copied());
        table
    }
}

impl SymbolTable {
    /// An empty table. Every lookup renders the hash.
    pub fn empty() -> Self { Self { names: HashMap::new() } }

    pub fn insert(&mut self, name: &str) {
        self.names.entry(fnv1a_hash(name)).or_insert_with(|| name.to_string());
    }

    /// Looks up `hash`, rendering it as `0x%08x` when unknown.
    pub fn resolve(&self, hash: u32) -> Cow<'_, str> {
        match self.names.get(&hash) {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(format!("{hash:#010x}")),
        }
    }

    pub fn len(&self) -> usize { self.names.len() }

    pub fn is_empty(&self) -> bool { self.names.is_empty() }
}

impl<'a> Extend<&'a str> for SymbolTable {
    fn extend<I: IntoIterator<Item = &'a str>>(&mut self, iter: I) {
        for name in iter {
            self.insert(name);
        }
    }
}
