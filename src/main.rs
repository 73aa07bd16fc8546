//! Example demonstrating shared, reference-counted content

use std::sync::Arc;

use content_engine::prelude::*;
use serde::{Deserialize, Serialize};

/// A texture referenced by several materials
#[derive(Debug, Default, Serialize, Deserialize)]
struct Texture {
    name: String,
    width: u32,
    height: u32,
}

impl Asset for Texture {}

/// A material pointing at its albedo texture
#[derive(Debug, Default, Serialize, Deserialize)]
struct Material {
    roughness: f32,
    albedo: ContentReference<Texture>,
}

impl Asset for Material {
    fn visit_references<'a>(&'a self, visitor: &mut ReferenceVisitor<'a>) {
        visitor.visit(&self.albedo);
    }
}

fn run() -> Result<(), AssetError> {
    let store = Arc::new(MemoryStore::new());
    let database = Arc::new(ObjectDatabase::open(store, "/data/db")?);

    let mut serializers = SerializerRegistry::new();
    serializers
        .register_serde::<Texture>()
        .register_serde::<Material>();
    let serializers = Arc::new(serializers);

    // Two materials sharing one texture
    let texture = Arc::new(Texture {
        name: "bricks".to_string(),
        width: 512,
        height: 512,
    });
    let saver = AssetManager::new(
        Arc::clone(&database),
        Arc::new(ObjectRegistry::new()),
        Arc::clone(&serializers),
        AssetManagerConfig::new().with_format(ChunkFormat::Json),
    );
    for (location, roughness) in [("materials/wall", 0.8), ("materials/floor", 0.4)] {
        let material = Arc::new(Material {
            roughness,
            albedo: ContentReference::from_value(Arc::clone(&texture)),
        });
        let id = saver.save(location, &material)?;
        log::info!("Saved {location} as {id}");
    }
    for location in database.locations() {
        log::info!("Stored: {location}");
    }

    // Load both through managers sharing one registry
    let registry = Arc::new(ObjectRegistry::new());
    let first = AssetManager::new(
        Arc::clone(&database),
        Arc::clone(&registry),
        Arc::clone(&serializers),
        AssetManagerConfig::default(),
    );
    let second = AssetManager::new(
        Arc::clone(&database),
        registry,
        serializers,
        AssetManagerConfig::default(),
    );

    let wall = first.load::<Material>("materials/wall")?;
    let floor = second.load::<Material>("materials/floor")?;
    if let (Some(a), Some(b)) = (wall.albedo.get(), floor.albedo.get()) {
        log::info!(
            "Texture {} shared: {} (reference count {})",
            a.name,
            Arc::ptr_eq(&a, &b),
            first.reference_count(&a)
        );
    }
    print!("{}", first.stats());

    first.unload(&wall)?;
    second.unload(&floor)?;
    print!("{}", first.stats());

    Ok(())
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Content demo error: {}", e);
    }
}
