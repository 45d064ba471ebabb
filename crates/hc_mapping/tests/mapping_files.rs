// crates/hc_mapping/tests/mapping_files.rs

//! 映射构建与文件往返的集成测试

use hc_mapping::{
    BoundaryPackage, CouplingStrategy, MappingBuilder, MappingError, MappingTable,
    SurfaceWaterGroundwater, TableFormat, TargetIndex,
};

const NAN: f64 = f64::NAN;

// ============================================================================
// 构建性质
// ============================================================================

#[test]
fn test_every_active_unit_mapped_exactly_once() {
    // 4x3 栅格，部分单元无数据
    let ids = [
        1.0, 1.0, NAN, //
        2.0, NAN, 3.0, //
        3.0, 3.0, 2.0, //
        NAN, NAN, 1.0,
    ];
    let targets = TargetIndex::new(&[3, 1, 2]).unwrap();
    let builder = MappingBuilder::new("cells", &ids);
    let table = builder.build(&targets).unwrap();

    assert_eq!(table.len(), builder.active_count().unwrap());
    assert_eq!(table.len(), 8);

    let mut sources: Vec<_> = table.iter().map(|p| p.source).collect();
    let n = sources.len();
    sources.dedup();
    assert_eq!(sources.len(), n, "源索引必须唯一且保持自然顺序");
    assert!(table.validate_bounds(ids.len(), targets.len()).is_ok());
}

#[test]
fn test_missing_identifiers_are_reported_not_dropped() {
    let ids = [1.0, 5.0, 6.0, 5.0];
    let targets = TargetIndex::new(&[1, 2]).unwrap();
    match MappingBuilder::new("cells", &ids).build(&targets) {
        Err(MappingError::UnknownIdentifier { missing, table }) => {
            assert_eq!(missing, vec![5, 6]);
            assert_eq!(table, "cells");
        }
        other => panic!("expected UnknownIdentifier, got {other:?}"),
    }
}

// ============================================================================
// 文件
// ============================================================================

#[test]
fn test_strategy_writes_readable_tables() {
    let dir = tempfile::tempdir().unwrap();
    let strategy = CouplingStrategy::SurfaceWaterGroundwater(SurfaceWaterGroundwater {
        basin_ids: vec![7, 3],
        packages: vec![
            BoundaryPackage {
                name: "RIV_SYS1".into(),
                cell_basin: vec![3.0, NAN, 7.0, 7.0],
                active: vec![true, true, false, true],
            },
            BoundaryPackage {
                name: "DRN".into(),
                cell_basin: vec![7.0, 7.0, 7.0, 3.0],
                active: vec![false, false, true, true],
            },
        ],
    });

    let paths = strategy.write_exchanges(dir.path().join("exchanges")).unwrap();
    assert_eq!(paths.len(), 2);
    assert!(paths[0].ends_with("riv_sys1_basin.tsv"));

    let riv = MappingTable::read(&paths[0]).unwrap();
    let pairs: Vec<_> = riv.iter().map(|p| (p.source, p.target)).collect();
    // 边界序号：单元 0 → 0，单元 1 → 1（无子流域），单元 3 → 2
    assert_eq!(pairs, vec![(0, 1), (2, 0)]);

    let drn = MappingTable::read_with(&paths[1], TableFormat::default().reversed(true)).unwrap();
    let pairs: Vec<_> = drn.iter().map(|p| (p.source, p.target)).collect();
    assert_eq!(pairs, vec![(0, 0), (1, 1)]);
}

#[test]
fn test_comma_delimited_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("map.csv");
    std::fs::write(&path, "source_index,target_index\n0,1\n1,1\n").unwrap();
    let format = TableFormat {
        delimiter: b',',
        reverse: false,
    };
    let table = MappingTable::read_with(&path, format).unwrap();
    assert_eq!(table.target_multiplicity()[&1], 2);
}
