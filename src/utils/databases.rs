// Tables exported into the JSON snapshot, in export order
pub const SNAPSHOT_TABLES: &[&str] = &[
    "CarMake", "CarModel", "CarDeal", "User", "Account", "Session",
];
