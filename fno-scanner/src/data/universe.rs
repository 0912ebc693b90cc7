//! Static F&O universe used when every discovery call fails.

use std::collections::HashSet;

/// Tickers that were delisted or renamed and no longer return quotes.
pub const DELISTED_SYMBOLS: &[&str] = &[
    "ADANITRANS",
    "PVR",
    "MOTHERSUMI",
    "IBULHSGFIN",
    "SRTRANSFIN",
    "CADILAHC",
    "MCDOWELLN",
];

const KNOWN_FO_SYMBOLS: &[&str] = &[
    "RELIANCE", "TCS", "HDFCBANK", "INFY", "HINDUNILVR", "ICICIBANK",
    "KOTAKBANK", "SBIN", "BHARTIARTL", "ITC", "ASIANPAINT", "LT",
    "AXISBANK", "MARUTI", "SUNPHARMA", "ULTRACEMCO", "TITAN", "WIPRO",
    "POWERGRID", "NTPC", "TATAMOTORS", "ONGC", "HCLTECH", "BAJFINANCE",
    "M&M", "TATASTEEL", "COALINDIA", "GRASIM", "HINDALCO", "JSWSTEEL",
    "INDUSINDBK", "HEROMOTOCO", "CIPLA", "DRREDDY", "EICHERMOT",
    "BAJAJFINSV", "BRITANNIA", "SHREECEM", "DIVISLAB", "BPCL",
    "GODREJCP", "DABUR", "BANDHANBNK", "BERGEPAINT", "BIOCON",
    "CANBK", "CHOLAFIN", "COLPAL", "CONCOR", "CUMMINSIND",
    "DLF", "ESCORTS", "EXIDEIND", "FEDERALBNK", "GAIL",
    "HAVELLS", "HDFCLIFE", "IDFCFIRSTB", "IGL", "INDIANB",
    "IOC", "IRCTC", "JINDALSTEL", "JUBLFOOD", "LICHSGFIN",
    "LUPIN", "MARICO", "MPHASIS", "MRF", "NAUKRI",
    "NMDC", "OFSS", "OIL", "PAGEIND", "PEL",
    "PETRONET", "PFC", "PNB", "POLYCAB", "RAMCOCEM",
    "RBLBANK", "RECLTD", "SAIL", "SBILIFE", "SIEMENS",
    "SRF", "TORNTPHARM", "TVSMOTOR", "UBL", "VEDL",
    "VOLTAS", "YESBANK", "ZEEL", "ADANIGREEN", "ADANIPORTS",
    "BAJAJ-AUTO",
];

/// Check whether a ticker is on the delisted list.
pub fn is_delisted(symbol: &str) -> bool {
    DELISTED_SYMBOLS.contains(&symbol)
}

/// The static known F&O universe, without delisted tickers.
pub fn known_fo_universe() -> HashSet<String> {
    KNOWN_FO_SYMBOLS
        .iter()
        .filter(|s| !is_delisted(s))
        .map(|s| s.to_string())
        .collect()
}
