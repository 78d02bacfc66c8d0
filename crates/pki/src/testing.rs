//! Deterministic PKI fixtures for tests across the workspace.
//!
//! A tiny Utopia (UT) PKI generated once and frozen: a CSCA, two DSCs
//! (one revoked), an expired CSCA, an unconstrained self-signed cert, a
//! CRL, a Latvian-signed master list containing the CSCA, and an SOD
//! over two sample data groups. Everything is EC P-256 / SHA-256 with
//! validity windows wide enough (2020-2040) that tests never age out.

/// Content of DG1 hashed into the fixture SOD.
pub const DG1_CONTENT: &[u8] = b"UTOPIA-DG1-MRZ-SAMPLE-DATA";
/// Content of DG2 hashed into the fixture SOD.
pub const DG2_CONTENT: &[u8] = b"UTOPIA-DG2-FACE-IMAGE-SAMPLE";

fn unhex(s: &str) -> Vec<u8> {
    hex::decode(s.split_whitespace().collect::<String>()).expect("fixture hex")
}

const CSCA_HEX: &str = "\
     308201983082013da00302010202021001300a06082a8648ce3d040302304231
     0b3009060355040613025554311d301b060355040a0c14476f7665726e6d656e
     74206f662055746f7069613114301206035504030c0b435343412055746f7069
     61301e170d3230303130313030303030305a170d343030313031303030303030
     5a3042310b3009060355040613025554311d301b060355040a0c14476f766572
     6e6d656e74206f662055746f7069613114301206035504030c0b435343412055
     746f7069613059301306072a8648ce3d020106082a8648ce3d03010703420004
     fa5116b0c7652214114b0351bac2f8dee4c5082931a421b6c0c8364546784a08
     05cc9279835b1203826eec7b043b6ab5dd3f0903fd0902e71f929b059247d961
     a3233021300f0603551d130101ff040530030101ff300e0603551d0f0101ff04
     0403020106300a06082a8648ce3d0403020349003046022100dd3319e1779f76
     69095679bdd6f883bc7c08be1986a8c0d51e8665edc65ae91f022100e57bdde1
     314b5d67e6f07d38bda98e19c91375a4432436537816c11fdce14edb";

const DSC_HEX: &str = "\
     3082019d30820142a00302010202022002300a06082a8648ce3d040302304231
     0b3009060355040613025554311d301b060355040a0c14476f7665726e6d656e
     74206f662055746f7069613114301206035504030c0b435343412055746f7069
     61301e170d3230303130313030303030305a170d343030313031303030303030
     5a304a310b3009060355040613025554311d301b060355040a0c14476f766572
     6e6d656e74206f662055746f706961311c301a06035504030c13446f63756d65
     6e74205369676e6572203030313059301306072a8648ce3d020106082a8648ce
     3d0301070342000486b413ce395bf143de84247806440ab4276876ad43c4b082
     d9a2c95241fa4be09dc337c2e1a172a11089ae48d376dd982ddba46dc5d152fc
     c76d91f60be5e977a320301e300c0603551d130101ff04023000300e0603551d
     0f0101ff040403020780300a06082a8648ce3d0403020349003046022100e797
     21d2fbed8c6b303a16e38556d94edc9ad764f6be339b30e6666f535a7bdf0221
     00d3523d9416e104c345a21aa295d36905fd419031fba4448daefdb2617f9882
     a3";

const REVOKED_DSC_HEX: &str = "\
     3082019c30820142a00302010202022003300a06082a8648ce3d040302304231
     0b3009060355040613025554311d301b060355040a0c14476f7665726e6d656e
     74206f662055746f7069613114301206035504030c0b435343412055746f7069
     61301e170d3230303130313030303030305a170d343030313031303030303030
     5a304a310b3009060355040613025554311d301b060355040a0c14476f766572
     6e6d656e74206f662055746f706961311c301a06035504030c13446f63756d65
     6e74205369676e6572203030323059301306072a8648ce3d020106082a8648ce
     3d03010703420004e2aebc72d114613e9956669a307a065547752a8e41626a8c
     71646b7dc1cca345e8a1432f855c57c25ccd76636f659152c823f6e1ad071c3b
     b4f9c9f6794d75d1a320301e300c0603551d130101ff04023000300e0603551d
     0f0101ff040403020780300a06082a8648ce3d0403020348003045022100dd8f
     b6194710f3908ae38f42e026940f12d739590646722a895bbd6f59e60e780220
     6c6142a4dd9c3e8c1a96f36ed9e7f61fefcaee890ee7ba0201ef3509fafcb002";

const EXPIRED_CSCA_HEX: &str = "\
     308201a53082014ba00302010202021000300a06082a8648ce3d040302304931
     0b3009060355040613025554311d301b060355040a0c14476f7665726e6d656e
     74206f662055746f706961311b301906035504030c12435343412055746f7069
     61204c6567616379301e170d3130303130313030303030305a170d3132303130
     313030303030305a3049310b3009060355040613025554311d301b060355040a
     0c14476f7665726e6d656e74206f662055746f706961311b301906035504030c
     12435343412055746f706961204c65676163793059301306072a8648ce3d0201
     06082a8648ce3d03010703420004862da34706f2278bb79a49b590d1c3bacde7
     2d9a66471c6d1d76b4ab9d9d1d8067806c8ba6a0d2641c92269f8d5c2bf8f96c
     355590d71d36502a9ce094c79c1da3233021300f0603551d130101ff04053003
     0101ff300e0603551d0f0101ff040403020106300a06082a8648ce3d04030203
     4800304502203ed2d658626293ba9dc7070b3312fff29004a47fee938ad83c43
     e98b72b1a3d7022100bed4ef2c625eca0198e8bd1c5a74a89ee6a779d3635481
     586ec722f03bde48b3";

const CSCA_NO_CONSTRAINTS_HEX: &str = "\
     308201953082013aa00302010202021002300a06082a8648ce3d040302304931
     0b3009060355040613025554311d301b060355040a0c14476f7665726e6d656e
     74206f662055746f706961311b301906035504030c124353434120556e636f6e
     73747261696e6564301e170d3230303130313030303030305a170d3430303130
     313030303030305a3049310b3009060355040613025554311d301b060355040a
     0c14476f7665726e6d656e74206f662055746f706961311b301906035504030c
     124353434120556e636f6e73747261696e65643059301306072a8648ce3d0201
     06082a8648ce3d03010703420004a43d32f13276f4650e8ca417da0204db1702
     844c0161107bce7e5d8e74f5e0e6ec5223b34cce659947ca2107e6c46018add4
     129721dfbc20ed6306d10cdae84ca3123010300e0603551d0f0101ff04040302
     0780300a06082a8648ce3d0403020349003046022100d53aeb33b2c10836c226
     584ed5374ae6b9981c3f87391123aecfb93f4f0bc119022100ece112ee813855
     269a9b0053adb386f4241b6df7002b094cb7447227c513308e";

const MASTER_LIST_SIGNER_HEX: &str = "\
     3082019030820136a00302010202023001300a06082a8648ce3d040302304731
     0b3009060355040613024c56311b3019060355040a0c124e6174696f6e616c20
     417574686f72697479311b301906035504030c124d6173746572204c69737420
     5369676e6572301e170d3230303130313030303030305a170d34303031303130
     30303030305a3047310b3009060355040613024c56311b3019060355040a0c12
     4e6174696f6e616c20417574686f72697479311b301906035504030c124d6173
     746572204c697374205369676e65723059301306072a8648ce3d020106082a86
     48ce3d03010703420004f5ea530544def09b62fadf2ca08bf0775e40f726929c
     665654f9fb2523455c120cbae937a46afbb90672351527b4283205c72ef5b411
     790c7578b8ad73fcd7ffa3123010300e0603551d0f0101ff040403020780300a
     06082a8648ce3d0403020348003045022005fa8106935bb17eb967817beb6b7b
     a2d0ac3741f606ee616e7adc9aaf7db972022100b23e34f4acf284ffa2251dd0
     88cd79c654cd9d95b67ac6b866d7c81b43285528";

const CRL_HEX: &str = "\
     3081e2308188020101300a06082a8648ce3d0403023042310b30090603550406
     13025554311d301b060355040a0c14476f7665726e6d656e74206f662055746f
     7069613114301206035504030c0b435343412055746f706961170d3230303130
     313030303030305a170d3430303130313030303030305a301530130202200317
     0d3231303630313030303030305a300a06082a8648ce3d040302034900304602
     2100a0c05c80266278d2789029db3e06fefbb84f6a13c7292c9acfed7abdf6eb
     ca2f022100bedeb911c396e178f73f0568e826325aca124d2a57f52b5074eed6
     46665b0abe";

const MASTER_LIST_CMS_HEX: &str = "\
     3082049c06092a864886f70d010702a082048d30820489020103310d300b0609
     608648016503040201308201b70606678108010102a08201ab048201a7308201
     a30201003182019c308201983082013da00302010202021001300a06082a8648
     ce3d0403023042310b3009060355040613025554311d301b060355040a0c1447
     6f7665726e6d656e74206f662055746f7069613114301206035504030c0b4353
     43412055746f706961301e170d3230303130313030303030305a170d34303031
     30313030303030305a3042310b3009060355040613025554311d301b06035504
     0a0c14476f7665726e6d656e74206f662055746f706961311430120603550403
     0c0b435343412055746f7069613059301306072a8648ce3d020106082a8648ce
     3d03010703420004fa5116b0c7652214114b0351bac2f8dee4c5082931a421b6
     c0c8364546784a0805cc9279835b1203826eec7b043b6ab5dd3f0903fd0902e7
     1f929b059247d961a3233021300f0603551d130101ff040530030101ff300e06
     03551d0f0101ff040403020106300a06082a8648ce3d04030203490030460221
     00dd3319e1779f7669095679bdd6f883bc7c08be1986a8c0d51e8665edc65ae9
     1f022100e57bdde1314b5d67e6f07d38bda98e19c91375a4432436537816c11f
     dce14edba08201943082019030820136a00302010202023001300a06082a8648
     ce3d0403023047310b3009060355040613024c56311b3019060355040a0c124e
     6174696f6e616c20417574686f72697479311b301906035504030c124d617374
     6572204c697374205369676e6572301e170d3230303130313030303030305a17
     0d3430303130313030303030305a3047310b3009060355040613024c56311b30
     19060355040a0c124e6174696f6e616c20417574686f72697479311b30190603
     5504030c124d6173746572204c697374205369676e65723059301306072a8648
     ce3d020106082a8648ce3d03010703420004f5ea530544def09b62fadf2ca08b
     f0775e40f726929c665654f9fb2523455c120cbae937a46afbb90672351527b4
     283205c72ef5b411790c7578b8ad73fcd7ffa3123010300e0603551d0f0101ff
     040403020780300a06082a8648ce3d0403020348003045022005fa8106935bb1
     7eb967817beb6b7ba2d0ac3741f606ee616e7adc9aaf7db972022100b23e34f4
     acf284ffa2251dd088cd79c654cd9d95b67ac6b866d7c81b4328552831820120
     3082011c020101304d3047310b3009060355040613024c56311b301906035504
     0a0c124e6174696f6e616c20417574686f72697479311b301906035504030c12
     4d6173746572204c697374205369676e657202023001300b0609608648016503
     040201a066301506092a864886f70d01090331080606678108010102301c0609
     2a864886f70d010905310f170d3236303830313131323733345a302f06092a86
     4886f70d0109043122042095f540d95ce0422b1b3f3dbab1d1b30c7c0075c79d
     0689a182e514cb9eb7b7aa300a06082a8648ce3d0403020447304502206e1ebc
     432484e276f4cd6de13a6d617b75e6c3afe969a1c3cb615dd17612827a022100
     9b5d1c960d2195ee6eebb48c4dbdcad1cf4966fa22a65d0aee0ffd3c92f8d05f";

const SOD_CMS_HEX: &str = "\
     3082035906092a864886f70d010702a082034a30820346020103310d300b0609
     608648016503040201306e0606678108010101a06404623060020100300b0609
     608648016503040201304e30250201010420d6efcae40c60bf694992c31ab529
     4cdf61d24aa710f29430e84d19aca01992e530250201020420711a72273200c6
     42ca767d26d13b8dfac1e51c2fa6e9e304473ce6b252ebbc69a08201a1308201
     9d30820142a00302010202022002300a06082a8648ce3d0403023042310b3009
     060355040613025554311d301b060355040a0c14476f7665726e6d656e74206f
     662055746f7069613114301206035504030c0b435343412055746f706961301e
     170d3230303130313030303030305a170d3430303130313030303030305a304a
     310b3009060355040613025554311d301b060355040a0c14476f7665726e6d65
     6e74206f662055746f706961311c301a06035504030c13446f63756d656e7420
     5369676e6572203030313059301306072a8648ce3d020106082a8648ce3d0301
     070342000486b413ce395bf143de84247806440ab4276876ad43c4b082d9a2c9
     5241fa4be09dc337c2e1a172a11089ae48d376dd982ddba46dc5d152fcc76d91
     f60be5e977a320301e300c0603551d130101ff04023000300e0603551d0f0101
     ff040403020780300a06082a8648ce3d0403020349003046022100e79721d2fb
     ed8c6b303a16e38556d94edc9ad764f6be339b30e6666f535a7bdf022100d352
     3d9416e104c345a21aa295d36905fd419031fba4448daefdb2617f9882a33182
     011b3082011702010130483042310b3009060355040613025554311d301b0603
     55040a0c14476f7665726e6d656e74206f662055746f70696131143012060355
     04030c0b435343412055746f70696102022002300b0609608648016503040201
     a066301506092a864886f70d01090331080606678108010101301c06092a8648
     86f70d010905310f170d3236303830313131323733345a302f06092a864886f7
     0d0109043122042079e92f79667c0f6c09dc192e655153b6dbbf10084e5bd83e
     41649e17ee5ef8f0300a06082a8648ce3d04030204473045022068430e398924
     dd582dc31c601b347d6080abf52a3455a4b06db305a7336a6b5002210089daf1
     10a6a4aca86085ca8a9beabc2f0deb2c6e5daeb7430ef0e2234e567504";

/// Self-signed Utopia CSCA (EC P-256, 2020-2040).
pub fn csca_der() -> Vec<u8> {
    unhex(CSCA_HEX)
}

/// Document Signer 001, issued by the CSCA.
pub fn dsc_der() -> Vec<u8> {
    unhex(DSC_HEX)
}

/// Document Signer 002, revoked in the CRL.
pub fn revoked_dsc_der() -> Vec<u8> {
    unhex(REVOKED_DSC_HEX)
}

/// Self-signed CSCA valid 2010-2012.
pub fn expired_csca_der() -> Vec<u8> {
    unhex(EXPIRED_CSCA_HEX)
}

/// Self-signed cert without Basic Constraints.
pub fn csca_no_constraints_der() -> Vec<u8> {
    unhex(CSCA_NO_CONSTRAINTS_HEX)
}

/// Latvian master list signer (self-signed).
pub fn master_list_signer_der() -> Vec<u8> {
    unhex(MASTER_LIST_SIGNER_HEX)
}

/// CRL from the CSCA revoking serial 2003.
pub fn crl_der() -> Vec<u8> {
    unhex(CRL_HEX)
}

/// CMS master list containing the CSCA, signed by the LV signer.
pub fn master_list_cms() -> Vec<u8> {
    unhex(MASTER_LIST_CMS_HEX)
}

/// SOD over DG1/DG2 (SHA-256), signed by the DSC.
pub fn sod_cms() -> Vec<u8> {
    unhex(SOD_CMS_HEX)
}

/// An anchor bundle already containing the master list signer.
pub fn anchors_with_master_list_signer() -> crate::anchors::TrustAnchors {
    let mut bundle = crate::anchors::TrustAnchors::empty();
    assert!(bundle.add_der(&master_list_signer_der()));
    bundle
}
