//! Filing fixtures and archive builders

use std::io::Write;

/// Build an in-memory zip archive from (name, content) pairs
pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

/// A minimal Form 990 e-file return
pub fn filing_xml(ein: &str, name: &str, revenue: u64) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<Return xmlns="http://www.irs.gov/efile" returnVersion="2022v5.0">
  <ReturnHeader>
    <TaxPeriodEndDt>2022-12-31</TaxPeriodEndDt>
    <Filer>
      <EIN>{ein}</EIN>
      <BusinessName>
        <BusinessNameLine1Txt>{name}</BusinessNameLine1Txt>
      </BusinessName>
      <USAddress>
        <AddressLine1Txt>1 MAIN ST</AddressLine1Txt>
        <CityNm>SPRINGFIELD</CityNm>
        <StateAbbreviationCd>IL</StateAbbreviationCd>
        <ZIPCd>62701</ZIPCd>
      </USAddress>
    </Filer>
  </ReturnHeader>
  <ReturnData documentCnt="2">
    <IRS990>
      <CYTotalRevenueAmt>{revenue}</CYTotalRevenueAmt>
      <AmendedReturnInd>X</AmendedReturnInd>
    </IRS990>
    <IRS990ScheduleB>
      <OrganizationName>{name}</OrganizationName>
    </IRS990ScheduleB>
  </ReturnData>
</Return>
"#
    )
}

/// Index page linking each of `hrefs`, plus some noise that is not an archive
pub fn index_page(hrefs: &[&str]) -> String {
    let mut page = String::from(
        "<html><body><a href=\"/about\">About</a><a href=\"/charities.pdf\">Guide</a>",
    );
    for href in hrefs {
        page.push_str(&format!("<p><a href=\"{}\">{}</a></p>", href, href));
    }
    page.push_str("</body></html>");
    page
}
