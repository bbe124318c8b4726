/// Symbolic row alias declared via the `_BaseName` directive column.
/// Examples: `StdAccount1`, `FleetVehicle_A`
pub type Alias = String;
/// Remote record identifier assigned by the CRM backend.
/// Examples: `001000000000001AAA`, `Account-00042`
pub type RemoteId = String;
/// Remote object type name, derived from scenario file names.
/// Examples: `Account`, `Vehicle`, `ContactPointTypeConsent`
pub type ObjectName = String;
/// Remote field name, including dotted projections for nested lookups.
/// Examples: `Name`, `PersonContactId`, `EngagementChannelType.Name`
pub type FieldName = String;
/// Raw CSV cell text before directive interpretation.
/// Examples: `TRUE`, `-30`, `Premium Care Plan`
pub type CellValue = String;
/// Resolved calendar date in ISO form.
/// Example: `2026-09-25`
pub type IsoDate = String;
/// Name of an environment whose variables override the defaults.
/// Examples: `qa`, `staging`
pub type EnvName = String;
