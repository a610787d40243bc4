use anyhow::Result;

use weighin_core::store::MeasurementStore;

pub(crate) fn cmd_init(store: &dyn MeasurementStore, json: bool) -> Result<()> {
    let seeded = store.initialize()?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "seeded": seeded, "store": store.describe() })
        );
    } else if seeded > 0 {
        println!("Seeded {seeded} sample measurements into {}", store.describe());
    } else {
        println!("{} already has data; nothing seeded", store.describe());
    }

    Ok(())
}
