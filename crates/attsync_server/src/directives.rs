//! Option reply sent to a device on `GET /iclock/cdata`.

use attsync_core::PushOptions;

/// Renders the option handshake for `serial`, lines joined with CRLF.
pub fn option_reply(serial: &str, options: &PushOptions) -> String {
    [
        format!("GET OPTION FROM: {serial}"),
        format!("ATTLOGStamp={}", options.attlog_stamp),
        format!("OPERLOGStamp={}", options.operlog_stamp),
        format!("ATTPHOTOStamp={}", options.attphoto_stamp),
        format!("ErrorDelay={}", options.error_delay),
        format!("Delay={}", options.delay),
        format!("TransTimes={}", options.trans_times),
        format!("TransInterval={}", options.trans_interval),
        format!("TransFlag={}", options.trans_flag),
        format!("Realtime={}", options.realtime),
        format!("TimeZone={}", options.time_zone),
        format!("Encrypt={}", options.encrypt),
    ]
    .join("\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reply() {
        let reply = option_reply("CQZ7", &PushOptions::default());
        let lines: Vec<&str> = reply.split("\r\n").collect();
        assert_eq!(
            lines,
            vec![
                "GET OPTION FROM: CQZ7",
                "ATTLOGStamp=0",
                "OPERLOGStamp=0",
                "ATTPHOTOStamp=0",
                "ErrorDelay=60",
                "Delay=5",
                "TransTimes=00:00;23:59",
                "TransInterval=1",
                "TransFlag=TransData AttLog OpLog",
                "Realtime=1",
                "TimeZone=7",
                "Encrypt=0",
            ]
        );
        assert!(!reply.ends_with("\r\n"));
    }

    #[test]
    fn values_come_from_options() {
        let options = PushOptions {
            time_zone: -3,
            attlog_stamp: 9999,
            ..PushOptions::default()
        };
        let reply = option_reply("X", &options);
        assert!(reply.contains("\r\nTimeZone=-3\r\n"));
        assert!(reply.contains("ATTLOGStamp=9999"));
    }
}
