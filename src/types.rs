//! Static catalog of built-in type oids
//!
//! Read-only data used to render oids as names. An oid missing from the table
//! is not an error; callers fall back to the number.

use std::collections::HashMap;
use std::sync::OnceLock;

/// A built-in Postgres type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeDescriptor {
    /// Type oid
    pub oid: u32,
    /// Type name as in `pg_type.typname`
    pub name: &'static str,
    /// Declared size in bytes; -1 is varlena, -2 is a C string
    pub size: i16,
}

const fn ty(oid: u32, name: &'static str, size: i16) -> TypeDescriptor {
    TypeDescriptor { oid, name, size }
}

static TYPES: &[TypeDescriptor] = &[
    ty(16, "bool", 1),
    ty(17, "bytea", -1),
    ty(18, "char", 1),
    ty(19, "name", 64),
    ty(20, "int8", 8),
    ty(21, "int2", 2),
    ty(22, "int2vector", -1),
    ty(23, "int4", 4),
    ty(24, "regproc", 4),
    ty(25, "text", -1),
    ty(26, "oid", 4),
    ty(27, "tid", 6),
    ty(28, "xid", 4),
    ty(29, "cid", 4),
    ty(30, "oidvector", -1),
    ty(114, "json", -1),
    ty(142, "xml", -1),
    ty(194, "pg_node_tree", -1),
    ty(600, "point", 16),
    ty(601, "lseg", 32),
    ty(602, "path", -1),
    ty(603, "box", 32),
    ty(604, "polygon", -1),
    ty(628, "line", 24),
    ty(650, "cidr", -1),
    ty(700, "float4", 4),
    ty(701, "float8", 8),
    ty(705, "unknown", -2),
    ty(718, "circle", 24),
    ty(774, "macaddr8", 8),
    ty(790, "money", 8),
    ty(829, "macaddr", 6),
    ty(869, "inet", -1),
    ty(1000, "_bool", -1),
    ty(1005, "_int2", -1),
    ty(1007, "_int4", -1),
    ty(1009, "_text", -1),
    ty(1016, "_int8", -1),
    ty(1021, "_float4", -1),
    ty(1022, "_float8", -1),
    ty(1033, "aclitem", 12),
    ty(1042, "bpchar", -1),
    ty(1043, "varchar", -1),
    ty(1082, "date", 4),
    ty(1083, "time", 8),
    ty(1114, "timestamp", 8),
    ty(1184, "timestamptz", 8),
    ty(1186, "interval", 16),
    ty(1266, "timetz", 12),
    ty(1560, "bit", -1),
    ty(1562, "varbit", -1),
    ty(1700, "numeric", -1),
    ty(1790, "refcursor", -1),
    ty(2202, "regprocedure", 4),
    ty(2203, "regoper", 4),
    ty(2204, "regoperator", 4),
    ty(2205, "regclass", 4),
    ty(2206, "regtype", 4),
    ty(2249, "record", -1),
    ty(2275, "cstring", -2),
    ty(2276, "any", 4),
    ty(2277, "anyarray", -1),
    ty(2278, "void", 4),
    ty(2279, "trigger", 4),
    ty(2281, "internal", 8),
    ty(2283, "anyelement", 4),
    ty(2776, "anynonarray", 4),
    ty(2950, "uuid", 16),
    ty(2970, "txid_snapshot", -1),
    ty(3220, "pg_lsn", 8),
    ty(3500, "anyenum", 4),
    ty(3614, "tsvector", -1),
    ty(3615, "tsquery", -1),
    ty(3734, "regconfig", 4),
    ty(3769, "regdictionary", 4),
    ty(3802, "jsonb", -1),
    ty(3831, "anyrange", -1),
    ty(3904, "int4range", -1),
    ty(3906, "numrange", -1),
    ty(3908, "tsrange", -1),
    ty(3910, "tstzrange", -1),
    ty(3912, "daterange", -1),
    ty(3926, "int8range", -1),
    ty(4089, "regnamespace", 4),
    ty(4096, "regrole", 4),
];

struct Catalog {
    by_oid: HashMap<u32, &'static TypeDescriptor>,
    by_name: HashMap<&'static str, &'static TypeDescriptor>,
}

fn catalog() -> &'static Catalog {
    static CATALOG: OnceLock<Catalog> = OnceLock::new();
    CATALOG.get_or_init(|| Catalog {
        by_oid: TYPES.iter().map(|t| (t.oid, t)).collect(),
        by_name: TYPES.iter().map(|t| (t.name, t)).collect(),
    })
}

/// Look a type up by oid
pub fn lookup_by_oid(oid: u32) -> Option<&'static TypeDescriptor> {
    catalog().by_oid.get(&oid).copied()
}

/// Look a type up by its `typname`
pub fn lookup_by_name(name: &str) -> Option<&'static TypeDescriptor> {
    catalog().by_name.get(name).copied()
}

/// Every known type, ordered by oid
pub fn all() -> &'static [TypeDescriptor] {
    TYPES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_oid() {
        let int4 = lookup_by_oid(23).unwrap();
        assert_eq!(int4.name, "int4");
        assert_eq!(int4.size, 4);
        assert_eq!(lookup_by_oid(25).map(|t| t.name), Some("text"));
    }

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(lookup_by_name("uuid").map(|t| t.oid), Some(2950));
        assert_eq!(lookup_by_name("jsonb").map(|t| t.size), Some(-1));
    }

    #[test]
    fn test_unknown_is_absent() {
        assert!(lookup_by_oid(999_999).is_none());
        assert!(lookup_by_name("no_such_type").is_none());
    }

    #[test]
    fn test_table_is_sorted_and_unique() {
        assert!(all().windows(2).all(|w| w[0].oid < w[1].oid));
        assert_eq!(catalog().by_name.len(), all().len());
    }
}
