//! EZSP frame identifiers.
//!
//! Only the handful of ids the driver itself sends have constants; the rest
//! are known by name for logging.

/// Negotiates the protocol version. Must be the first command after reset.
pub const VERSION: u8 = 0x00;
/// Asks the coprocessor to deliver pending callbacks.
pub const CALLBACK: u8 = 0x06;
/// Response to [`CALLBACK`] when nothing is pending.
pub const NO_CALLBACKS: u8 = 0x07;
pub const NOP: u8 = 0x05;
pub const ECHO: u8 = 0x81;
pub const GET_EUI64: u8 = 0x26;
pub const GET_NODE_ID: u8 = 0x27;
/// Sent by the coprocessor in place of a response it could not produce.
pub const INVALID_COMMAND: u8 = 0x58;

/// Frame ids that only ever arrive as callbacks.
pub const CALLBACK_IDS: [u8; 50] = [
    0x07, 0x0D, 0x0F, 0x19, 0x1B, 0x1C, 0x23, 0x24, 0x31, 0x32, 0x3F, 0x43, 0x44, 0x45, 0x46, 0x48,
    0x54, 0x59, 0x62, 0x6E, 0x78, 0x7C, 0x7D, 0x80, 0x8E, 0x92, 0x93, 0x97, 0x98, 0x9B, 0x9E, 0xA0,
    0xA7, 0xB6, 0xB7, 0xB8, 0xBB, 0xD5, 0xD6, 0xDA, 0xDB, 0xDC, 0xDE, 0xE0, 0xE1, 0xE3, 0xE4, 0xE9,
    0xEB, 0xF2,
];

const CALLBACK_TABLE: [bool; 256] = {
    let mut table = [false; 256];
    let mut i = 0;
    while i < CALLBACK_IDS.len() {
        table[CALLBACK_IDS[i] as usize] = true;
        i += 1;
    }
    table
};

/// True when `id` is a callback-only frame id.
pub fn is_callback_id(id: u8) -> bool {
    CALLBACK_TABLE[usize::from(id)]
}

/// Protocol name of a frame id, e.g. `incomingMessageHandler`.
pub fn command_name(id: u8) -> Option<&'static str> {
    let name = match id {
        0x00 => "version",
        0x01 => "getLibraryStatus",
        0x02 => "addEndpoint",
        0x03 => "getExtendedValue",
        0x05 => "nop",
        0x06 => "callback",
        0x07 => "noCallbacks",
        0x09 => "setToken",
        0x0A => "getToken",
        0x0B => "getMfgToken",
        0x0C => "setMfgToken",
        0x0D => "stackTokenChangedHandler",
        0x0E => "setTimer",
        0x0F => "timerHandler",
        0x10 => "setConcentrator",
        0x12 => "debugWrite",
        0x13 => "getXncpInfo",
        0x14 => "requestLinkKey",
        0x15 => "setManufacturerCode",
        0x16 => "setPowerDescriptor",
        0x17 => "networkInit",
        0x18 => "networkState",
        0x19 => "stackStatusHandler",
        0x1A => "startScan",
        0x1B => "networkFoundHandler",
        0x1C => "scanCompleteHandler",
        0x1D => "stopScan",
        0x1E => "formNetwork",
        0x1F => "joinNetwork",
        0x20 => "leaveNetwork",
        0x21 => "findAndRejoinNetwork",
        0x22 => "permitJoining",
        0x23 => "childJoinHandler",
        0x24 => "trustCenterJoinHandler",
        0x26 => "getEui64",
        0x27 => "getNodeId",
        0x28 => "getNetworkParameters",
        0x29 => "getParentChildParameters",
        0x2A => "clearBindingTable",
        0x2B => "setBinding",
        0x2C => "getBinding",
        0x2D => "deleteBinding",
        0x2E => "bindingIsActive",
        0x2F => "getBindingRemoteNodeId",
        0x30 => "setBindingRemoteNodeId",
        0x31 => "remoteSetBindingHandler",
        0x32 => "remoteDeleteBindingHandler",
        0x33 => "maximumPayloadLength",
        0x34 => "sendUnicast",
        0x36 => "sendBroadcast",
        0x37 => "proxyBroadcast",
        0x38 => "sendMulticast",
        0x39 => "sendReply",
        0x3F => "messageSentHandler",
        0x41 => "sendManyToOneRouteRequest",
        0x42 => "pollForData",
        0x43 => "pollCompleteHandler",
        0x44 => "pollHandler",
        0x45 => "incomingMessageHandler",
        0x46 => "macFilterMatchMessageHandler",
        0x47 => "customFrame",
        0x48 => "energyScanResultHandler",
        0x49 => "getRandomNumber",
        0x4A => "getChildData",
        0x4E => "getTimer",
        0x52 => "getConfigurationValue",
        0x53 => "setConfigurationValue",
        0x54 => "customFrameHandler",
        0x55 => "setPolicy",
        0x56 => "getPolicy",
        0x58 => "invalidCommand",
        0x59 => "incomingRouteRecordHandler",
        0x5A => "setSourceRoute",
        0x5B => "addressTableEntryIsActive",
        0x5C => "setAddressTableRemoteEui64",
        0x5D => "setAddressTableRemoteNodeId",
        0x5E => "getAddressTableRemoteEui64",
        0x5F => "getAddressTableRemoteNodeId",
        0x60 => "lookupNodeIdByEui64",
        0x61 => "lookupEui64ByNodeId",
        0x62 => "incomingSenderEui64Handler",
        0x63 => "getMulticastTableEntry",
        0x64 => "setMulticastTableEntry",
        0x65 => "readAndClearCounters",
        0x66 => "addOrUpdateKeyTableEntry",
        0x68 => "setInitialSecurityState",
        0x69 => "getCurrentSecurityState",
        0x6A => "getKey",
        0x6E => "switchNetworkKeyHandler",
        0x6F => "aesMmoHash",
        0x70 => "networkInitExtended",
        0x71 => "getKeyTableEntry",
        0x72 => "setKeyTableEntry",
        0x73 => "broadcastNextNetworkKey",
        0x74 => "broadcastNetworkKeySwitch",
        0x75 => "findKeyTableEntry",
        0x76 => "eraseKeyTableEntry",
        0x77 => "becomeTrustCenter",
        0x78 => "dsaVerifyHandler",
        0x79 => "getNeighbor",
        0x7A => "neighborCount",
        0x7B => "getRouteTableEntry",
        0x7C => "idConflictHandler",
        0x7D => "incomingManyToOneRouteRequestHandler",
        0x7E => "setExtendedTimeout",
        0x7F => "getExtendedTimeout",
        0x80 => "incomingRouteErrorHandler",
        0x81 => "echo",
        0x82 => "replaceAddressTableEntry",
        0x83 => "mfglibStart",
        0x84 => "mfglibEnd",
        0x85 => "mfglibStartTone",
        0x86 => "mfglibStopTone",
        0x87 => "mfglibStartStream",
        0x88 => "mfglibStopStream",
        0x89 => "mfglibSendPacket",
        0x8A => "mfglibSetChannel",
        0x8B => "mfglibGetChannel",
        0x8C => "mfglibSetPower",
        0x8D => "mfglibGetPower",
        0x8E => "mfglibRxHandler",
        0x8F => "launchStandaloneBootloader",
        0x90 => "sendBootloadMessage",
        0x91 => "getStandaloneBootloaderVersionPlatMicroPhy",
        0x92 => "incomingBootloadMessageHandler",
        0x93 => "bootloadTransmitCompleteHandler",
        0x94 => "aesEncrypt",
        0x95 => "overrideCurrentChannel",
        0x96 => "sendRawMessage",
        0x97 => "macPassthroughMessageHandler",
        0x98 => "rawTransmitCompleteHandler",
        0x99 => "setRadioPower",
        0x9A => "setRadioChannel",
        0x9B => "zigbeeKeyEstablishmentHandler",
        0x9C => "energyScanRequest",
        0x9D => "delayTest",
        0x9E => "generateCbkeKeysHandler",
        0x9F => "calculateSmacs",
        0xA0 => "calculateSmacsHandler",
        0xA1 => "clearTemporaryDataMaybeStoreLinkKey",
        0xA2 => "setPreinstalledCbkeData",
        0xA3 => "dsaVerify",
        0xA4 => "generateCbkeKeys",
        0xA5 => "getCertificate",
        0xA6 => "dsaSign",
        0xA7 => "dsaSignHandler",
        0xA8 => "removeDevice",
        0xA9 => "unicastNwkKeyUpdate",
        0xAA => "getValue",
        0xAB => "setValue",
        0xAC => "setGpioCurrentConfiguration",
        0xAD => "setGpioPowerUpDownConfiguration",
        0xAE => "setGpioRadioPowerMask",
        0xB1 => "clearKeyTable",
        0xB2 => "zllNetworkOps",
        0xB3 => "zllSetInitialSecurityState",
        0xB4 => "zllStartScan",
        0xB5 => "zllSetRxOnWhenIdle",
        0xB6 => "zllNetworkFoundHandler",
        0xB7 => "zllScanCompleteHandler",
        0xB8 => "zllAddressAssignmentHandler",
        0xB9 => "setLogicalAndRadioChannel",
        0xBA => "getLogicalChannel",
        0xBB => "zllTouchLinkTargetHandler",
        0xBC => "zllGetTokens",
        0xBD => "zllSetDataToken",
        0xBE => "isZllNetwork",
        0xBF => "zllSetNonZllNetwork",
        0xD0 => "rf4ceSetPairingTableEntry",
        0xD1 => "rf4ceGetPairingTableEntry",
        0xD2 => "rf4ceDeletePairingTableEntry",
        0xD3 => "rf4ceKeyUpdate",
        0xD4 => "rf4ceSend",
        0xD5 => "rf4ceIncomingMessageHandler",
        0xD6 => "rf4ceMessageSentHandler",
        0xD7 => "rf4ceStart",
        0xD8 => "rf4ceStop",
        0xD9 => "rf4ceDiscovery",
        0xDA => "rf4ceDiscoveryCompleteHandler",
        0xDB => "rf4ceDiscoveryRequestHandler",
        0xDC => "rf4ceDiscoveryResponseHandler",
        0xDD => "rf4ceEnableAutoDiscoveryResponse",
        0xDE => "rf4ceAutoDiscoveryResponseCompleteHandler",
        0xDF => "rf4cePair",
        0xE0 => "rf4cePairCompleteHandler",
        0xE1 => "rf4cePairRequestHandler",
        0xE2 => "rf4ceUnpair",
        0xE3 => "rf4ceUnpairHandler",
        0xE4 => "rf4ceUnpairCompleteHandler",
        0xE5 => "rf4ceSetPowerSavingParameters",
        0xE6 => "rf4ceSetFrequencyAgilityParameters",
        0xE7 => "rf4ceSetApplicationInfo",
        0xE8 => "generateCbkeKeys283k1",
        0xE9 => "generateCbkeKeysHandler283k1",
        0xEA => "calculateSmacs283k1",
        0xEB => "calculateSmacsHandler283k1",
        0xEC => "getCertificate283k1",
        0xED => "savePreinstalledCbkeData283k1",
        0xEE => "clearTemporaryDataMaybeStoreLinkKey283k1",
        0xEF => "rf4ceGetApplicationInfo",
        0xF1 => "readCounters",
        0xF2 => "counterRolloverHandler",
        0xF3 => "rf4ceGetMaxPayload",
        _ => return None,
    };
    Some(name)
}

/// Like [`command_name`], falling back to the hex id.
pub fn display_name(id: u8) -> String {
    match command_name(id) {
        Some(name) => name.to_string(),
        None => format!("unknown(0x{id:02X})"),
    }
}

/// Readable EZSP status, as carried by `invalidCommand` responses.
pub fn status_name(status: u8) -> &'static str {
    match status {
        0x00 => "success",
        0x30 => "version not set",
        0x31 => "invalid frame id",
        0x32 => "wrong direction",
        0x33 => "truncated",
        0x34 => "overflow",
        0x35 => "out of memory",
        0x36 => "invalid value",
        0x37 => "invalid id",
        0x38 => "invalid call",
        0x39 => "no response",
        0x40 => "command too long",
        0x41 => "queue full",
        0x42 => "command filtered",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_names() {
        assert_eq!(command_name(VERSION), Some("version"));
        assert_eq!(command_name(CALLBACK), Some("callback"));
        assert_eq!(command_name(INVALID_COMMAND), Some("invalidCommand"));
        assert_eq!(command_name(0x45), Some("incomingMessageHandler"));
        assert_eq!(command_name(0x19), Some("stackStatusHandler"));
    }

    #[test]
    fn unknown_ids_fall_back_to_hex() {
        assert_eq!(command_name(0xFF), None);
        assert_eq!(display_name(0xFF), "unknown(0xFF)");
    }

    #[test]
    fn status_names() {
        assert_eq!(status_name(0x30), "version not set");
        assert_eq!(status_name(0x99), "unknown");
    }

    #[test]
    fn callback_classification() {
        assert!(is_callback_id(NO_CALLBACKS));
        assert!(is_callback_id(0x45));
        assert!(!is_callback_id(VERSION));
        assert!(!is_callback_id(CALLBACK));
        assert!(!is_callback_id(INVALID_COMMAND));
        assert_eq!((0..=255u8).filter(|&id| is_callback_id(id)).count(), CALLBACK_IDS.len());
    }

    #[test]
    fn every_callback_has_a_name() {
        for id in CALLBACK_IDS {
            let name = command_name(id).unwrap();
            assert!(name.contains("Handler") || id == NO_CALLBACKS, "{name}");
        }
    }
}
