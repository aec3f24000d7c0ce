#![allow(non_snake_case)]

// Базовые модули
pub mod consts;
pub mod error;
pub mod metrics;

// Потоки-носители снапшота
pub mod stream; // src/stream/{mod,file,memory}.rs

// Кодек примитивов (LE-скаляры, массивы, строки)
pub mod codec;

// Контейнер и модульный слой
pub mod container; // src/container/{mod,module}.rs

// Удобные реэкспорты
pub use container::{version_at_least, Module, ModuleInfo, ProducerInfo, Snapshot};
pub use error::{Result, SnapshotError, SnapshotErrorKind};
pub use stream::{FileStream, MemoryStream, SnapshotStream};
