use crate::db::DatabaseError;

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// Serde goes through the same string table so stored, wire and
/// in-memory spellings never drift apart.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

str_enum!(DocumentType {
    NationalId => "national_id",
    Passport => "passport",
    DriversLicense => "drivers_license",
    LegacyId => "legacy_id",
    Other => "other",
});

impl DocumentType {
    /// Lenient mapping for labels coming from recognition providers.
    /// Unknown labels become `Other` instead of failing the whole response.
    pub fn from_label(label: &str) -> Self {
        let key = label.trim().to_lowercase().replace([' ', '-'], "_");
        match key.as_str() {
            "national_id" | "id_card" | "identity_card" | "nid" => Self::NationalId,
            "passport" => Self::Passport,
            "drivers_license" | "driver_license" | "driving_licence" | "driving_license" => {
                Self::DriversLicense
            }
            "legacy_id" | "old_id" | "old_id_card" => Self::LegacyId,
            _ => Self::Other,
        }
    }
}

str_enum!(GuestStatus {
    Pending => "pending",
    CheckedIn => "checked_in",
    CheckedOut => "checked_out",
});

str_enum!(MatchType {
    IdNumber => "id_number",
    NameBirthDate => "name+birth_date",
});

str_enum!(MatchConfidence {
    High => "high",
    Medium => "medium",
});

impl MatchConfidence {
    /// Higher rank wins when two rules hit the same record.
    pub fn rank(&self) -> u8 {
        match self {
            Self::High => 2,
            Self::Medium => 1,
        }
    }
}

str_enum!(RoomStatus {
    Available => "available",
    Occupied => "occupied",
    Maintenance => "maintenance",
});

str_enum!(SyncStatus {
    Pending => "pending",
    Processed => "processed",
    Failed => "failed",
});
