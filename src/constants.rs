use crate::poll::PollPolicy;

/// Constants for the directive-column grammar understood by the row parser.
pub mod directives {
    /// Column whose cell declares the row's symbolic alias.
    pub const BASE_NAME_COLUMN: &str = "_BaseName";
    /// Prefix marking every directive column; such columns never reach payloads.
    pub const DIRECTIVE_PREFIX: char = '_';
    /// Column prefix for cross-row reference resolution (`_Ref:<Field>`).
    pub const REF_PREFIX: &str = "_Ref:";
    /// Column prefix for post-insert value capture (`_Return:<Field>`).
    pub const RETURN_PREFIX: &str = "_Return:";
    /// Column-name suffix marking signed day-offset date fields.
    pub const DATE_SUFFIX: &str = "__date";
    /// Directive column carrying the consent expiry offset; its resolved
    /// value is re-attached to every raw row for consent management.
    pub const EFFECTIVE_TO_COLUMN: &str = "_EffectiveTo__date";
    /// Cell spelling recognized as boolean true (case-insensitive).
    pub const BOOL_TRUE: &str = "TRUE";
    /// Cell spelling recognized as boolean false (case-insensitive).
    pub const BOOL_FALSE: &str = "FALSE";
}

/// Constants for consent-management directive columns and status values.
pub mod consent {
    /// Directive column requesting a solicitation opt-out on the person's
    /// individual record.
    pub const OPT_OUT_SOLICIT_COLUMN: &str = "_HasOptedOutSolicit";
    /// Per-channel fallback directive column for the Email channel.
    pub const EMAIL_CONSENT_COLUMN: &str = "_EmailConsent";
    /// Per-channel fallback directive column for the SMS channel.
    pub const SMS_CONSENT_COLUMN: &str = "_SMSConsent";
    /// Prefix for per-channel/per-purpose override columns
    /// (`_DataUsePurpose_<Channel>:<Purpose>`).
    pub const PURPOSE_OVERRIDE_PREFIX: &str = "_DataUsePurpose_";
    /// Consent status granting contact on a channel.
    pub const STATUS_OPT_IN: &str = "OptIn";
    /// Consent status denying contact on a channel; also the fallback when a
    /// known channel has no directive column.
    pub const STATUS_OPT_OUT: &str = "OptOut";
    /// Channel name covered by the Email fallback column.
    pub const CHANNEL_EMAIL: &str = "Email";
    /// Channel name covered by the SMS fallback column.
    pub const CHANNEL_SMS: &str = "SMS";
}

/// Constants for bulk request sizing against the remote store.
pub mod bulk {
    /// Names per exact-match lookup query.
    pub const EXACT_QUERY_CHUNK: usize = 200;
    /// Names per fuzzy (contains) lookup query; smaller because each name
    /// expands into its own filter clause.
    pub const FUZZY_QUERY_CHUNK: usize = 50;
    /// Ids per id-filtered lookup query.
    pub const ID_QUERY_CHUNK: usize = 200;
    /// Records per insert request for the person-account object; its
    /// post-save automation budget rejects larger requests.
    pub const PERSON_ACCOUNT_INSERT_CHUNK: usize = 20;
}

/// Poll policies for the backend's eventually-consistent derived data.
pub mod poll {
    use super::PollPolicy;
    use std::time::Duration;

    /// Policy for generic `_Return:<Field>` capture after insert.
    pub const RETURN_FIELDS: PollPolicy = PollPolicy {
        max_attempts: 10,
        interval: Duration::from_millis(500),
    };
    /// Policy for person-contact-id capture after person-account insert.
    pub const CONTACT_ID: PollPolicy = PollPolicy {
        max_attempts: 3,
        interval: Duration::from_secs(2),
    };
    /// Policy for individual-record linkage ahead of consent management.
    pub const INDIVIDUAL: PollPolicy = PollPolicy {
        max_attempts: 20,
        interval: Duration::from_secs(1),
    };
    /// Policy for consent-record availability per individual.
    pub const CONSENT: PollPolicy = PollPolicy {
        max_attempts: 15,
        interval: Duration::from_secs(1),
    };
}

/// Remote object type names with dedicated handler behavior.
pub mod objects {
    /// Person-account object; chunked inserts, cascade delete, consent flows.
    pub const PERSON_ACCOUNT: &str = "Account";
    /// Individual record linked to a person account.
    pub const INDIVIDUAL: &str = "Individual";
    /// Per-channel consent record linked to an individual.
    pub const CONSENT_RECORD: &str = "ContactPointTypeConsent";
    /// Vehicle object; deletes its linked assets first.
    pub const VEHICLE: &str = "Vehicle";
    /// Asset object; some fields immutable after creation.
    pub const ASSET: &str = "Asset";
    /// Vehicle-definition object; product linkage immutable after creation.
    pub const VEHICLE_DEFINITION: &str = "VehicleDefinition";
    /// Ownership-participant join object between assets and accounts.
    pub const PARTICIPANT: &str = "AssetAccountParticipant";
    /// Physical-location object; circularly referenced by its address.
    pub const LOCATION: &str = "Location";
}

/// Remote field names the engine reads or writes outside of CSV payloads.
pub mod fields {
    /// Primary key field on every object.
    pub const ID: &str = "Id";
    /// Display-name field used for existing-record matching.
    pub const NAME: &str = "Name";
    /// Derived contact id on a person account.
    pub const PERSON_CONTACT_ID: &str = "PersonContactId";
    /// Derived individual id on a person account.
    pub const PERSON_INDIVIDUAL_ID: &str = "PersonIndividualId";
    /// Foreign key from a consent record to its individual.
    pub const PARTY_ID: &str = "PartyId";
    /// Solicitation opt-out flag on an individual.
    pub const HAS_OPTED_OUT_SOLICIT: &str = "HasOptedOutSolicit";
    /// Foreign key from a vehicle to its asset.
    pub const ASSET_ID: &str = "AssetId";
    /// Foreign key to an account; create-only on assets and participants.
    pub const ACCOUNT_ID: &str = "AccountId";
    /// Foreign key to a contact; create-only on assets.
    pub const CONTACT_ID: &str = "ContactId";
    /// Foreign key to a product; create-only on vehicle definitions.
    pub const PRODUCT_ID: &str = "ProductId";
    /// Foreign key to a vehicle; create-only on participants.
    pub const VEHICLE_ID: &str = "VehicleId";
    /// Circular foreign key from a location to its visitor address.
    pub const VISITOR_ADDRESS_ID: &str = "VisitorAddressId";
    /// Ownership flag the backend resets on participant insert.
    pub const IS_OWNERSHIP: &str = "IsOwnership__c";
    /// Consent status field on a consent record.
    pub const PRIVACY_CONSENT_STATUS: &str = "PrivacyConsentStatus";
    /// Consent expiry field on a consent record.
    pub const EFFECTIVE_TO: &str = "EffectiveTo";
    /// Projected channel name on a consent record.
    pub const CHANNEL_NAME: &str = "EngagementChannelType.Name";
    /// Projected data-use purpose name on a consent record.
    pub const PURPOSE_NAME: &str = "DataUsePurpose.Name";
}

/// Constants for scenario file discovery and naming.
pub mod files {
    /// Scenario file extension (matched case-insensitively).
    pub const CSV_EXTENSION: &str = "csv";
    /// Stem suffix marking a file for upsert processing (case-insensitive).
    pub const UPDATE_SUFFIX: &str = "_update";
    /// Separator between a display prefix and the object segment in a stem.
    pub const DISPLAY_SEPARATOR: &str = " - ";
    /// Default scenario root directory relative to the working directory.
    pub const DEFAULT_SCENARIO_ROOT: &str = "scenarios";
}
