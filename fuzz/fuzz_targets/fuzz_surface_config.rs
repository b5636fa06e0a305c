#![no_main]

use libfuzzer_sys::fuzz_target;
use portage_runtime::SurfaceConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(serde_json::Value::Object(props)) = serde_json::from_str::<serde_json::Value>(text) else {
        return;
    };

    // Coercion must never panic, and anything it accepts must validate.
    if let Ok(config) = SurfaceConfig::from_props(&props) {
        assert!(config.validate().is_ok(), "accepted config fails validation");
        assert!(config.content_gap.is_finite() && config.content_gap >= 0.0);
        if let Some(index) = config.selected_detent_index {
            assert!(config.detent_at(index).is_some(), "selected detent out of range");
        }
        for detent in &config.detents {
            let fraction = detent.fraction();
            assert!(fraction > 0.0 && fraction <= 1.0, "detent fraction {fraction} out of range");
        }
    }
});
