//! Lightning Source (LSI) ACS column headers, in file order.

/// Columns of the LSI title-setup CSV.
pub const LSI_HEADERS: &[&str] = &[
    "Lightning Source Account #",
    "Metadata Contact Dictionary",
    "Parent ISBN",
    "ISBN or SKU",
    "Rendition /Booktype",
    "Title",
    "Publisher",
    "Imprint",
    "Cover/Jacket Submission Method",
    "Text Block SubmissionMethod",
    "Contributor One",
    "Contributor One Role",
    "Reserved 1",
    "Reserved 2",
    "Reserved 3",
    "Reserved 4",
    "Custom Trim Width (inches)",
    "Custom Trim Height (inches)",
    "Weight(Lbs)",
    "Reserved 5",
    "Reserved 6",
    "Reserved 7",
    "Reserved 8",
    "Marketing Image",
    "Pub Date",
    "Street Date",
    "Territorial Rights",
    "Contributor Two",
    "Contributor Two Role",
    "Contributor Three",
    "Contributor Three Role",
    "Edition Number",
    "Edition Description",
    "Jacket Path / Filename",
    "Interior Path / Filename",
    "Cover Path / Filename",
    "Annotation / Summary",
    "Reserved (Special Instructions)",
    "LSI Special Category",
    "Stamped Text LEFT",
    "Stamped Text CENTER",
    "Stamped Text RIGHT",
    "Order Type Eligibility",
    "Returnable",
    "BISAC Category",
    "Language Code",
    "LSI FlexField1",
    "LSI FlexField2",
    "LSI FlexField3",
    "LSI FlexField4",
    "LSI FlexField5",
    "Reserved 11",
    "Reserved 12",
    "BISAC Category 2",
    "BISAC Category 3",
    "Publisher Reference ID",
    "Reserved 9",
    "Reserved 10",
    "Carton Pack Quantity",
    "Contributor One BIO",
    "Contributor One Affiliations",
    "Contributor One Professional Position",
    "Contributor One Location",
    "Contributor One Location Type Code",
    "Contributor One Prior Work",
    "Keywords",
    "Thema Subject 1",
    "Thema Subject 2",
    "Thema Subject 3",
    "Regional Subjects",
    "Audience",
    "Min Age",
    "Max Age",
    "Min Grade",
    "Max Grade",
    "Short Description",
    "Table of Contents",
    "Review Quote(s)",
    "# Illustrations",
    "Illustration Notes",
    "Series Name",
    "# in Series",
    "Spine Width (inches)",
    "Copyright Year",
    "Interior Color",
    "Paper Type",
    "Cover Type",
    "Lamination",
    "US Suggested List Price",
    "US Wholesale Discount",
    "UK Suggested List Price",
    "UK Wholesale Discount (%)",
    "EU Suggested List Price (mode 2)",
    "EU Wholesale Discount % (Mode 2)",
    "AU Suggested List Price (mode 2)",
    "AU Wholesale Discount % (Mode 2)",
    "CA Suggested List Price (mode 2)",
    "CA Wholesale Discount % (Mode 2)",
    "GC Suggested List Price (mode 2)",
    "GC Wholesale Discount % (Mode 2)",
    "JP Suggested List Price (mode 2)",
    "JP Wholesale Discount % (Mode 2)",
    "IN Suggested List Price (mode 2)",
    "IN Wholesale Discount % (Mode 2)",
    "USBR1 Suggested List Price (mode 2)",
    "USBR1 Wholesale Discount % (Mode 2)",
    "USDE1 Suggested List Price (mode 2)",
    "USDE1 Wholesale Discount % (Mode 2)",
    "USRU1 Suggested List Price (mode 2)",
    "USRU1 Wholesale Discount % (Mode 2)",
    "USPL1 Suggested List Price (mode 2)",
    "USPL1 Wholesale Discount % (Mode 2)",
    "USKR1 Suggested List Price (mode 2)",
    "USKR1 Wholesale Discount % (Mode 2)",
    "USCN1 Suggested List Price (mode 2)",
    "USCN1 Wholesale Discount % (Mode 2)",
    "USIN1 Suggested List Price (mode 2)",
    "USIN1 Wholesale Discount % (Mode 2)",
    "USJP2 Suggested List Price (mode 2)",
    "USJP2 Wholesale Discount % (Mode 2)",
    "UAEUSD Suggested List Price (mode 2)",
    "UAEUSD Wholesale Discount % (Mode 2)",
    "US-Ingram-Only Suggested List Price (mode 2)",
    "US-Ingram-Only Wholesale Discount % (Mode 2)",
    "US-Ingram-GAP Suggested List Price (mode 2)",
    "US-Ingram-GAP Wholesale Discount % (Mode 2)",
    "SIBI-EDUC-US Suggested List Price (mode 2)",
    "SIBI-EDUC-US Wholesale Discount % (Mode 2)",
];

/// Territories priced at parity with the US list price.
pub const USD_MARKET_TERRITORIES: &[&str] = &[
    "USBR1",
    "USDE1",
    "USRU1",
    "USPL1",
    "USKR1",
    "USCN1",
    "USIN1",
    "USJP2",
    "UAEUSD",
    "US-Ingram-Only",
    "US-Ingram-GAP",
    "SIBI-EDUC-US",
];

/// Territories whose list price is converted from USD.
pub const CONVERTED_TERRITORIES: &[&str] = &["UK", "EU", "AU", "CA", "GC", "JP", "IN"];

/// Header list as owned strings.
pub fn lsi_headers() -> Vec<String> {
    LSI_HEADERS.iter().map(|h| h.to_string()).collect()
}

/// List-price column for a territory code.
pub fn price_header(territory: &str) -> String {
    match territory {
        "US" => "US Suggested List Price".to_string(),
        "UK" => "UK Suggested List Price".to_string(),
        t => format!("{} Suggested List Price (mode 2)", t),
    }
}

/// Wholesale-discount column for a territory code.
pub fn discount_header(territory: &str) -> String {
    match territory {
        "US" => "US Wholesale Discount".to_string(),
        "UK" => "UK Wholesale Discount (%)".to_string(),
        t => format!("{} Wholesale Discount % (Mode 2)", t),
    }
}
