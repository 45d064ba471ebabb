// crates/hc_mapping/src/lib.rs

//! HydroCouple Mapping Layer (Layer 2)
//!
//! 映射层。在时间循环开始前，为两个索引方式不同的离散化建立静态的稀疏
//! 对应表（网格单元、网络节点、集总单元、子流域之间）。
//!
//! # 模块概览
//!
//! - [`table`]: `MappingTable` 对应表及其文件读写
//! - [`builder`]: 由标识符栅格构建对应表
//! - [`grid`]: 子单元网格、节点/井与地表单元的对应及内部索引查找
//! - [`strategy`]: 三种耦合组合的映射生成策略
//! - [`error`]: 映射错误类型
//!
//! # 示例
//!
//! ```
//! use hc_mapping::{MappingBuilder, TargetIndex};
//!
//! // 每个网格单元所属的子流域编号，NaN 表示不参与耦合
//! let cell_basin = [3.0, 3.0, f64::NAN, 7.0];
//! let basins = TargetIndex::new(&[7, 3]).unwrap();
//!
//! let table = MappingBuilder::new("cell_basin", &cell_basin).build(&basins).unwrap();
//! let pairs: Vec<_> = table.iter().map(|p| (p.source, p.target)).collect();
//! assert_eq!(pairs, vec![(0, 1), (1, 1), (3, 0)]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod error;
pub mod grid;
pub mod strategy;
pub mod table;

/// 层级标识
pub const LAYER: u8 = 2;

pub use builder::{is_active, verify_active_count, MappingBuilder, Numbering, TargetIndex};
pub use error::MappingError;
pub use grid::{SubunitGrid, UnitLookup, WellLocation};
pub use strategy::{
    BoundaryPackage, CouplingStrategy, GroundwaterLandSurface, LandSurfaceSurfaceWater,
    SurfaceWaterGroundwater,
};
pub use table::{MappingPair, MappingTable, TableFormat};
