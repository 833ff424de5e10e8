/// Data layer: cube types and loading.
///
/// Architecture:
/// ```text
///  .parquet / .json / .csv   (one spaxel per row)
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → DataCube
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │   DataCube    │  wave_rest, flux (λ, y, x), labels (λ, y, x)
///   └──────────────┘
///        │
///        ▼
///   compress / decompose  (per selected spaxel)
/// ```

pub mod loader;
pub mod model;
