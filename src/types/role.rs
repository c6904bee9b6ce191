use std::fmt;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Declares a small-integer enum as stored in the database, together with
/// its snake_case label used on the command line and in serialized output.
macro_rules! coded_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($(#[$variant_meta:meta])* $variant:ident = $code:literal => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$variant_meta])* $variant),+
        }

        impl $name {
            pub const fn code(self) -> i64 {
                match self {
                    $(Self::$variant => $code),+
                }
            }

            pub fn from_code(code: i64) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }

            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($label => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.code()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let code = value.as_i64()?;
                Self::from_code(code).ok_or(FromSqlError::OutOfRange(code))
            }
        }
    };
}

coded_enum! {
    /// Lifecycle state shared by every entity and relation row.
    #[derive(Default)]
    Status {
        #[default]
        Active = 0 => "active",
        Inactive = 1 => "inactive",
    }
}

coded_enum! {
    SystemRole {
        SysAdmin = 0 => "sys_admin",
        SysMember = 1 => "sys_member",
    }
}

coded_enum! {
    OrgRole {
        OrgAdmin = 2 => "org_admin",
        OrgMember = 3 => "org_member",
    }
}

coded_enum! {
    TeamRole {
        TeamAdmin = 4 => "team_admin",
        TeamMember = 5 => "team_member",
    }
}

coded_enum! {
    /// Effective role of a caller in some scope, as returned by the
    /// permission resolver. Codes match the scoped role enums.
    Role {
        SysAdmin = 0 => "sys_admin",
        SysMember = 1 => "sys_member",
        OrgAdmin = 2 => "org_admin",
        OrgMember = 3 => "org_member",
        TeamAdmin = 4 => "team_admin",
        TeamMember = 5 => "team_member",
    }
}

coded_enum! {
    /// Default access an organization grants to members without an explicit mapping.
    MemberPrivilege {
        Write = 0 => "write",
        Read = 1 => "read",
        None = 2 => "none",
    }
}

coded_enum! {
    /// Access level a team holds on a repository.
    Permit {
        Write = 0 => "write",
        Read = 1 => "read",
    }
}

impl Status {
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl Role {
    /// Position in the global ranking. Admin roles of different scopes share
    /// a rank, as do member roles; the ranking is only meaningful for
    /// is-at-least checks.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::SysAdmin => 3,
            Self::OrgAdmin | Self::TeamAdmin => 2,
            Self::OrgMember | Self::TeamMember => 1,
            Self::SysMember => 0,
        }
    }

    #[must_use]
    pub const fn is_at_least(self, other: Role) -> bool {
        self.rank() >= other.rank()
    }
}

impl From<SystemRole> for Role {
    fn from(role: SystemRole) -> Self {
        match role {
            SystemRole::SysAdmin => Role::SysAdmin,
            SystemRole::SysMember => Role::SysMember,
        }
    }
}

impl From<OrgRole> for Role {
    fn from(role: OrgRole) -> Self {
        match role {
            OrgRole::OrgAdmin => Role::OrgAdmin,
            OrgRole::OrgMember => Role::OrgMember,
        }
    }
}

impl From<TeamRole> for Role {
    fn from(role: TeamRole) -> Self {
        match role {
            TeamRole::TeamAdmin => Role::TeamAdmin,
            TeamRole::TeamMember => Role::TeamMember,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::Active.code(), 0);
        assert_eq!(Status::Inactive.code(), 1);
        assert_eq!(Status::from_code(1), Some(Status::Inactive));
        assert_eq!(Status::from_code(7), None);
    }

    #[test]
    fn test_role_codes_are_distinct() {
        let roles = [
            Role::SysAdmin,
            Role::SysMember,
            Role::OrgAdmin,
            Role::OrgMember,
            Role::TeamAdmin,
            Role::TeamMember,
        ];
        let codes: HashSet<i64> = roles.iter().map(|r| r.code()).collect();
        assert_eq!(codes.len(), roles.len());
        assert_eq!(Status::default(), Status::Active);
    }

    #[test]
    fn test_scoped_roles_keep_their_codes() {
        assert_eq!(Role::from(OrgRole::OrgAdmin).code(), OrgRole::OrgAdmin.code());
        assert_eq!(Role::from(TeamRole::TeamMember).code(), TeamRole::TeamMember.code());
        assert_eq!(Role::from(SystemRole::SysAdmin).code(), SystemRole::SysAdmin.code());
    }

    #[test]
    fn test_role_ranking() {
        assert!(Role::SysAdmin.is_at_least(Role::OrgAdmin));
        assert!(Role::OrgAdmin.is_at_least(Role::TeamAdmin));
        assert!(Role::TeamAdmin.is_at_least(Role::OrgAdmin));
        assert!(Role::TeamAdmin.is_at_least(Role::OrgMember));
        assert!(!Role::OrgMember.is_at_least(Role::TeamAdmin));
        assert!(!Role::OrgAdmin.is_at_least(Role::SysAdmin));
    }

    #[test]
    fn test_parse_labels() {
        assert_eq!(Role::parse("org_admin"), Some(Role::OrgAdmin));
        assert_eq!(MemberPrivilege::parse("none"), Some(MemberPrivilege::None));
        assert_eq!(Permit::parse("admin"), None);
        assert_eq!(TeamRole::TeamAdmin.to_string(), "team_admin");
    }
}
